//! HTTP route handlers for the agent API.

use agent::core::types::{ConversationResult, Task, TaskError};
use agent::pipeline::ToolStatsSnapshot;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::sse;
use crate::state::AppState;

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/chat/message", post(post_message))
        .route("/tasks/{id}", get(get_task))
        .route("/tasks/{id}/result", get(get_result))
        .route("/tasks/{id}/cancel", post(cancel_task))
        .route("/tasks/{id}/events", get(sse::events_handler))
        .route("/tools/stats", get(tool_stats))
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    message: String,
    /// Accepted for client compatibility; runs are not grouped by session.
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatResponse {
    task_id: String,
    message: String,
    success: bool,
    async_task: bool,
}

/// POST /api/chat/message - start a conversation in the background.
async fn post_message(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, StatusCode> {
    let text = request.message.trim().to_string();
    if text.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    state.orchestrator.log_tool_stats();

    let task_id = state.orchestrator.start_task(&text);
    info!(%task_id, session_id = ?request.session_id, "chat message accepted");

    let orchestrator = state.orchestrator.clone();
    let spawned_id = task_id.clone();
    tokio::spawn(async move {
        if let Err(err) = orchestrator.run(&spawned_id, &text, &[]).await {
            error!(task_id = %spawned_id, "run failed to start: {err:#}");
        }
    });

    Ok(Json(ChatResponse {
        task_id,
        message: "Task started, subscribe to its event stream for progress".to_string(),
        success: true,
        async_task: true,
    }))
}

/// GET /api/tasks/{id} - current task status.
async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<Task>, StatusCode> {
    state
        .orchestrator
        .status(&task_id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// GET /api/tasks/{id}/result - the stored conversation result, once finished.
async fn get_result(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<ConversationResult>, StatusCode> {
    state
        .orchestrator
        .result(&task_id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CancelResponse {
    task_id: String,
    cancelled: bool,
}

/// POST /api/tasks/{id}/cancel - request cooperative cancellation.
///
/// `cancelled` is false when the task had already reached a terminal state.
async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<CancelResponse>, StatusCode> {
    match state.orchestrator.cancel(&task_id) {
        Ok(cancelled) => Ok(Json(CancelResponse { task_id, cancelled })),
        Err(TaskError::NotFound(_)) => Err(StatusCode::NOT_FOUND),
        Err(err) => {
            warn!(%task_id, %err, "cancel rejected");
            Err(StatusCode::CONFLICT)
        }
    }
}

/// GET /api/tools/stats - per-tool invocation counters.
async fn tool_stats(State(state): State<AppState>) -> Json<Vec<ToolStatsSnapshot>> {
    Json(state.orchestrator.tool_stats())
}
