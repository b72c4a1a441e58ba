//! Agent server - HTTP API and live event streams for conversation runs.

mod routes;
mod sse;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use agent::io::config::load_config;
use agent::io::model::CommandModel;
use agent::io::project::FsProjectAnalyzer;
use agent::io::prompt::PromptEngine;
use agent::logging;
use agent::orchestrator::Orchestrator;
use agent::tools::ToolRegistry;
use agent::tools::smart_edit::SmartEditTool;
use axum::Router;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::sse::ChannelSink;
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "agent-server")]
#[command(about = "HTTP API for running agent conversations")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "3001")]
    port: u16,

    /// Agent configuration file (defaults apply when missing)
    #[arg(long, default_value = "agent.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_with_default("agent_server=info,agent=info");

    let args = Args::parse();
    let config = load_config(&args.config)?;
    info!(
        config = %args.config.display(),
        workspace = %config.workspace_root.display(),
        max_turns = config.max_turns,
        "starting agent-server"
    );

    let prompts = Arc::new(PromptEngine::new()?);
    let model = Arc::new(CommandModel::new(&config.model, config.turn_timeout()));
    let smart_edit = SmartEditTool::new(
        model.clone(),
        Arc::new(FsProjectAnalyzer::default()),
        Arc::clone(&prompts),
        config.workspace_root.clone(),
    )
    .with_fallback(config.fallback_plan);
    let tools = ToolRegistry::new().with(Arc::new(smart_edit))?;

    let sink = Arc::new(ChannelSink::default());
    let orchestrator = Orchestrator::new(model, sink.clone())?
        .with_tools(tools)
        .with_prompts(prompts)
        .with_budget(config.budget())
        .with_validator(config.validation.validator())
        .with_plan_delay(config.plan_delay());
    let state = AppState::new(orchestrator, sink);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .nest("/api", routes::api_router())
        .layer(cors)
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
