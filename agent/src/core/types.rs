//! Shared deterministic types for the conversation engine.
//!
//! These types define stable contracts between the registry, the orchestrator,
//! and tools. They do not depend on external state or I/O.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque task identifier handed out by the task registry.
pub type TaskId = String;

/// Lifecycle status of a task.
///
/// Transitions only move forward: `Pending -> Running -> {Completed, Failed}`.
/// `Pending -> Failed` is allowed for tasks cancelled before their run starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskState {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "PENDING",
            TaskState::Running => "RUNNING",
            TaskState::Completed => "COMPLETED",
            TaskState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }

    pub fn can_transition_to(self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Pending, TaskState::Running)
                | (TaskState::Pending, TaskState::Failed)
                | (TaskState::Running, TaskState::Completed)
                | (TaskState::Running, TaskState::Failed)
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Distinguishable task-level failures. Callers recover these from
/// `anyhow::Error` with `downcast_ref`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("task not found: {0}")]
    NotFound(TaskId),
    #[error("task {task_id}: invalid status transition {from} -> {to}")]
    InvalidTransition {
        task_id: TaskId,
        from: TaskState,
        to: TaskState,
    },
    #[error("conversation result already recorded for task {0}")]
    ResultAlreadyRecorded(TaskId),
}

/// One user-initiated unit of work, as observed by status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub task_id: TaskId,
    pub(crate) status: TaskState,
    pub current_turn: u32,
    /// Advisory estimate from the complexity estimator; never enforced.
    pub total_estimated_turns: u32,
    pub current_action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Task {
    pub fn new(task_id: TaskId, total_estimated_turns: u32) -> Self {
        Self {
            task_id,
            status: TaskState::Pending,
            current_turn: 0,
            total_estimated_turns,
            current_action: "task created, waiting to start".to_string(),
            summary: None,
            error_message: None,
        }
    }

    pub fn status(&self) -> TaskState {
        self.status
    }

    /// Move the task forward; regressions and repeated terminal writes are rejected.
    pub fn transition(&mut self, next: TaskState) -> Result<(), TaskError> {
        if !self.status.can_transition_to(next) {
            return Err(TaskError::InvalidTransition {
                task_id: self.task_id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single conversation entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// Outcome of one model round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnResult {
    Succeeded { response_text: String },
    Failed { error_message: String },
}

impl TurnResult {
    pub fn is_success(&self) -> bool {
        matches!(self, TurnResult::Succeeded { .. })
    }

    pub fn response_text(&self) -> Option<&str> {
        match self {
            TurnResult::Succeeded { response_text } => Some(response_text),
            TurnResult::Failed { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            TurnResult::Succeeded { .. } => None,
            TurnResult::Failed { error_message } => Some(error_message),
        }
    }
}

/// Terminal summary of a gracefully finished run. Written once per task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationResult {
    /// Non-empty turn responses joined by blank lines.
    pub full_response: String,
    pub turn_responses: Vec<String>,
    pub final_history: Vec<Message>,
    pub total_turns: u32,
    pub reached_turn_limit: bool,
    pub stop_reason: Option<String>,
    pub total_duration_ms: u64,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// Outcome of one tool execution.
///
/// `content` is the observation fed back to the model; `display` is the richer
/// payload forwarded to human observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ToolResult {
    Success {
        content: String,
        #[serde(rename = "displayPayload")]
        display: Value,
    },
    Error {
        #[serde(rename = "errorMessage")]
        message: String,
    },
}

impl ToolResult {
    pub fn success(content: impl Into<String>, display: Value) -> Self {
        ToolResult::Success {
            content: content.into(),
            display,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ToolResult::Error {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolResult::Success { .. })
    }

    /// Text handed back to the model as the tool's observation.
    pub fn observation(&self) -> &str {
        match self {
            ToolResult::Success { content, .. } => content,
            ToolResult::Error { message } => message,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            ToolResult::Success { .. } => None,
            ToolResult::Error { message } => Some(message),
        }
    }
}
