//! Per-run task context handed explicitly to everything that emits events.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::core::types::TaskId;
use crate::io::events::{EventKind, EventSink, StepStatus, TaskEvent};

/// Length of the request preview in the analysis-start event.
const PREVIEW_CHARS: usize = 50;

/// Attribution for one task's run.
///
/// Events emitted through a context always carry its task id and
/// non-decreasing timestamps. Dropping the context closes the task's sink
/// stream, on every exit path.
pub struct TaskContext {
    task_id: TaskId,
    sink: Arc<dyn EventSink>,
    last_timestamp: Mutex<Option<DateTime<Utc>>>,
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("task_id", &self.task_id)
            .finish_non_exhaustive()
    }
}

impl TaskContext {
    pub fn new(task_id: impl Into<TaskId>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            task_id: task_id.into(),
            sink,
            last_timestamp: Mutex::new(None),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Stamp and forward one event.
    pub fn emit(&self, mut event: TaskEvent) {
        event.task_id.clone_from(&self.task_id);
        {
            let mut last = self
                .last_timestamp
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(prev) = *last
                && event.timestamp < prev
            {
                event.timestamp = prev;
            }
            *last = Some(event.timestamp);
        }
        self.sink.emit(event);
    }

    fn event(&self, kind: EventKind, message: impl Into<String>) -> TaskEvent {
        TaskEvent::new(kind, self.task_id.clone(), message)
    }

    pub fn task_analysis_start(&self, request: &str) {
        self.emit(
            self.event(EventKind::TaskAnalysisStart, "analyzing the request")
                .with_step("task analysis")
                .with_status(StepStatus::Analyzing)
                .with_description(format!("analyzing request: {}", preview(request))),
        );
    }

    pub fn analysis_step(&self, step_name: &str, description: &str, status: StepStatus) {
        self.emit(
            self.event(EventKind::AnalysisStep, description)
                .with_step(step_name)
                .with_status(status),
        );
    }

    pub fn execution_plan(&self, plan_summary: &str) {
        self.emit(
            self.event(EventKind::ExecutionPlan, "execution plan generated")
                .with_step("execution plan")
                .with_status(StepStatus::Completed)
                .with_description(plan_summary),
        );
    }

    pub fn tool_start(&self, tool: &str, subject: Option<&str>) {
        let message = match subject {
            Some(subject) => format!("{tool}: {subject}"),
            None => tool.to_string(),
        };
        self.emit(
            self.event(EventKind::ToolStart, message)
                .with_icon("🛠️")
                .with_details(serde_json::json!({ "tool": tool, "subject": subject })),
        );
    }

    pub fn tool_success(&self, tool: &str, elapsed_ms: u64, display: Value) {
        self.emit(
            self.event(EventKind::ToolSuccess, format!("{tool} succeeded"))
                .with_icon("✅")
                .with_execution_time(elapsed_ms)
                .with_details(display),
        );
    }

    pub fn tool_error(&self, tool: &str, elapsed_ms: u64, error: &str) {
        self.emit(
            self.event(EventKind::ToolError, format!("{tool} failed: {error}"))
                .with_icon("❌")
                .with_execution_time(elapsed_ms)
                .with_description(error),
        );
    }

    pub fn task_complete(&self, summary: &str) {
        self.emit(
            self.event(EventKind::TaskComplete, "conversation task finished")
                .with_description(summary),
        );
    }

    pub fn task_failed(&self, error: &str) {
        self.emit(
            self.event(EventKind::TaskFailed, "conversation task failed")
                .with_description(error),
        );
    }
}

impl Drop for TaskContext {
    fn drop(&mut self) {
        self.sink.close(&self.task_id);
    }
}

/// First `PREVIEW_CHARS` characters, ellipsised when cut.
fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
