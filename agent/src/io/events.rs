//! Progress event vocabulary and delivery sinks.
//!
//! Events are the product stream consumed by clients (SSE in the server, JSON
//! lines in the CLI). They are separate from `tracing` diagnostics: sinks are
//! fed regardless of `RUST_LOG`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::core::types::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    ConnectionEstablished,
    TaskAnalysisStart,
    AnalysisStep,
    ExecutionPlan,
    ToolStart,
    ToolSuccess,
    ToolError,
    TaskComplete,
    TaskFailed,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionEstablished => "CONNECTION_ESTABLISHED",
            Self::TaskAnalysisStart => "TASK_ANALYSIS_START",
            Self::AnalysisStep => "ANALYSIS_STEP",
            Self::ExecutionPlan => "EXECUTION_PLAN",
            Self::ToolStart => "TOOL_START",
            Self::ToolSuccess => "TOOL_SUCCESS",
            Self::ToolError => "TOOL_ERROR",
            Self::TaskComplete => "TASK_COMPLETE",
            Self::TaskFailed => "TASK_FAILED",
        }
    }

    /// Events after which no further events are emitted for the task.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::TaskComplete | Self::TaskFailed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Analyzing,
    Completed,
    Error,
}

/// One observable progress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub task_id: TaskId,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StepStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl TaskEvent {
    pub fn new(kind: EventKind, task_id: impl Into<TaskId>, message: impl Into<String>) -> Self {
        Self {
            kind,
            task_id: task_id.into(),
            message: message.into(),
            timestamp: Utc::now(),
            step_name: None,
            status: None,
            execution_time_ms: None,
            description: None,
            icon: None,
            details: None,
        }
    }

    pub fn connection_established(task_id: impl Into<TaskId>) -> Self {
        Self::new(
            EventKind::ConnectionEstablished,
            task_id,
            "connected to the task event stream",
        )
    }

    pub fn with_step(mut self, step_name: impl Into<String>) -> Self {
        let step_name = step_name.into();
        self.icon = Some(analysis_icon(&step_name).to_string());
        self.step_name = Some(step_name);
        self
    }

    pub fn with_status(mut self, status: StepStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_execution_time(mut self, millis: u64) -> Self {
        self.execution_time_ms = Some(millis);
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Icon shown next to an analysis step.
pub fn analysis_icon(step_name: &str) -> &'static str {
    match step_name {
        "task analysis" => "🧠",
        "requirement understanding" => "💡",
        "execution plan" => "📋",
        "tech selection" => "🔧",
        "architecture design" => "🏗️",
        "file planning" => "📁",
        "code generation" => "💻",
        "testing" => "✅",
        _ => "🔍",
    }
}

/// Delivery target for task events.
///
/// Implementations must tolerate emits after the consumer has gone away and
/// repeated closes.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: TaskEvent);

    /// Release per-task resources. Idempotent.
    fn close(&self, _task_id: &str) {}
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: TaskEvent) {}
}

/// Forwards events to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: TaskEvent) {
        info!(
            task_id = %event.task_id,
            kind = event.kind.as_str(),
            step = event.step_name.as_deref().unwrap_or(""),
            "{}",
            event.message
        );
    }
}
