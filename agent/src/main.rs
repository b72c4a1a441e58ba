//! Command-line entry point for the agent engine.
//!
//! `agent run` drives one conversation to completion, printing task events as
//! JSON lines on stdout and the final result as pretty JSON.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use agent::core::complexity;
use agent::core::schema::ValidationMode;
use agent::exit_codes;
use agent::io::config::{AgentConfig, load_config, write_config};
use agent::io::events::{EventSink, TaskEvent};
use agent::io::model::CommandModel;
use agent::io::project::FsProjectAnalyzer;
use agent::io::prompt::PromptEngine;
use agent::logging;
use agent::orchestrator::{Orchestrator, RunOutcome};
use agent::tools::ToolRegistry;
use agent::tools::smart_edit::SmartEditTool;
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;

const DEFAULT_CONFIG: &str = "agent.toml";

#[derive(Parser)]
#[command(name = "agent", version, about = "Multi-turn coding agent")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the advisory turn estimate for a request.
    Estimate { text: String },
    /// Run one conversation to completion.
    Run {
        text: String,
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },
    /// Write a default config file.
    InitConfig {
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        path: PathBuf,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Check a JSON parameters file against a JSON Schema file.
    ValidateParams {
        schema: PathBuf,
        params: PathBuf,
        #[arg(long, value_enum, default_value_t = Mode::Strict)]
        mode: Mode,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Mode {
    Strict,
    Permissive,
    Tiered,
}

impl From<Mode> for ValidationMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Strict => Self::Strict,
            Mode::Permissive => Self::Permissive,
            Mode::Tiered => Self::Tiered,
        }
    }
}

/// Prints each event as one JSON line.
struct StdoutSink;

impl EventSink for StdoutSink {
    fn emit(&self, event: TaskEvent) {
        if let Ok(line) = serde_json::to_string(&event) {
            let mut out = std::io::stdout().lock();
            // Stdout closed by the reader is not worth aborting the run for.
            let _ = writeln!(out, "{line}");
        }
    }
}

#[tokio::main]
async fn main() {
    logging::init();
    let code = match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Estimate { text } => {
            println!("{}", complexity::estimate(&text));
            Ok(exit_codes::OK)
        }
        Command::Run { text, config } => cmd_run(&text, &config).await,
        Command::InitConfig { path, force } => {
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            write_config(&path, &AgentConfig::default())?;
            println!("wrote {}", path.display());
            Ok(exit_codes::OK)
        }
        Command::ValidateParams {
            schema,
            params,
            mode,
        } => cmd_validate_params(&schema, &params, mode.into()),
    }
}

async fn cmd_run(text: &str, config_path: &Path) -> Result<i32> {
    let config = load_config(config_path)?;
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

    let orchestrator = Orchestrator::new(model, Arc::new(StdoutSink))?
        .with_tools(tools)
        .with_prompts(prompts)
        .with_budget(config.budget())
        .with_validator(config.validation.validator())
        .with_plan_delay(config.plan_delay());

    let task_id = orchestrator.start_task(text);
    let outcome = orchestrator.run(&task_id, text, &[]).await?;
    orchestrator.log_tool_stats();
    match outcome {
        RunOutcome::Completed(result) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&result).context("serialize result")?
            );
            Ok(exit_codes::OK)
        }
        RunOutcome::Failed { error } => {
            eprintln!("task {task_id} failed: {error}");
            Ok(exit_codes::FAILED)
        }
    }
}

fn cmd_validate_params(schema: &Path, params: &Path, mode: ValidationMode) -> Result<i32> {
    let schema = read_json(schema)?;
    let params = read_json(params)?;
    match mode.validator().validate(&schema, &params) {
        None => {
            println!("ok");
            Ok(exit_codes::OK)
        }
        Some(message) => {
            println!("{message}");
            Ok(exit_codes::INVALID)
        }
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}
