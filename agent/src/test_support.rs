//! Scripted collaborators for tests. Enabled by the `test-support` feature.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::{Value, json};

use crate::context::TaskContext;
use crate::core::continuation::ContinuationPolicy;
use crate::core::types::{Message, ToolCall, ToolResult};
use crate::io::events::{EventKind, EventSink, TaskEvent};
use crate::io::model::{ModelClient, ModelResponse};
use crate::tools::Tool;

/// One scripted model reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    WithTools(String, Vec<ToolCall>),
    /// Reported failure (`ModelResponse::Failed`).
    Fail(String),
    /// Invocation error (`Err`).
    Error(String),
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn tool(text: impl Into<String>, name: &str, arguments: Value) -> Self {
        Self::WithTools(
            text.into(),
            vec![ToolCall {
                name: name.to_string(),
                arguments,
            }],
        )
    }
}

/// Model that replays a fixed script. Once exhausted it answers with empty text.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Reply>>,
    delay: Option<Duration>,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedModel {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Every call sleeps for `delay` (on the tokio clock) before replying.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Histories received, one per call.
    pub fn seen(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(&self, history: &[Message]) -> Result<ModelResponse> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(history.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            None => Ok(ModelResponse::text("")),
            Some(Reply::Text(text)) => Ok(ModelResponse::text(text)),
            Some(Reply::WithTools(text, tool_calls)) => {
                Ok(ModelResponse::Completed { text, tool_calls })
            }
            Some(Reply::Fail(error)) => Ok(ModelResponse::Failed { error }),
            Some(Reply::Error(error)) => Err(anyhow!(error)),
        }
    }
}

/// Sink that records everything it sees.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TaskEvent>>,
    closed: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<TaskEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().into_iter().map(|e| e.kind).collect()
    }

    pub fn events_for(&self, task_id: &str) -> Vec<TaskEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.task_id == task_id)
            .collect()
    }

    pub fn closed(&self) -> Vec<String> {
        self.closed.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: TaskEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    fn close(&self, task_id: &str) {
        self.closed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task_id.to_string());
    }
}

#[derive(Debug, Clone)]
enum Outcome {
    Success(String),
    Failure(String),
    Error(String),
}

/// Tool with a fixed outcome that counts how often its body runs.
///
/// Its schema requires `project_path` and `edit_description`.
#[derive(Debug)]
pub struct FakeTool {
    name: String,
    outcome: Outcome,
    calls: AtomicU32,
}

impl FakeTool {
    fn new(name: &str, outcome: Outcome) -> Self {
        Self {
            name: name.to_string(),
            outcome,
            calls: AtomicU32::new(0),
        }
    }

    pub fn succeeding(name: &str) -> Self {
        Self::new(name, Outcome::Success(format!("{name} done")))
    }

    pub fn failing(name: &str, message: &str) -> Self {
        Self::new(name, Outcome::Failure(message.to_string()))
    }

    pub fn erroring(name: &str, message: &str) -> Self {
        Self::new(name, Outcome::Error(message.to_string()))
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for FakeTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "scripted test tool"
    }

    fn parameter_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "project_path": { "type": "string" },
                "edit_description": { "type": "string" }
            },
            "required": ["project_path", "edit_description"]
        })
    }

    async fn execute(&self, params: Value, _ctx: Option<&TaskContext>) -> Result<ToolResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.outcome {
            Outcome::Success(content) => Ok(ToolResult::success(content.clone(), params)),
            Outcome::Failure(message) => Ok(ToolResult::error(message.clone())),
            Outcome::Error(message) => Err(anyhow!(message.clone())),
        }
    }
}

/// Continue until `turns` turns have run, ignoring content.
#[derive(Debug, Clone, Copy)]
pub struct StopAfter(pub u32);

impl ContinuationPolicy for StopAfter {
    fn should_continue(&self, _history: &[Message], turn_count: u32, _last: Option<&str>) -> bool {
        turn_count < self.0
    }
}

/// Never stops on its own; only the turn cap ends the run.
#[derive(Debug, Clone, Copy)]
pub struct NeverStop;

impl ContinuationPolicy for NeverStop {
    fn should_continue(&self, _history: &[Message], _turn_count: u32, _last: Option<&str>) -> bool {
        true
    }
}

/// Temporary workspace holding one project directory.
pub struct TestProject {
    dir: tempfile::TempDir,
}

impl TestProject {
    /// Workspace with a project named `name` containing `files`.
    pub fn new(name: &str, files: &[(&str, &str)]) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        for (rel, contents) in files {
            let path = dir.path().join(name).join(rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, contents)?;
        }
        std::fs::create_dir_all(dir.path().join(name))?;
        Ok(Self { dir })
    }

    pub fn workspace(&self) -> &Path {
        self.dir.path()
    }

    pub fn project(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}
