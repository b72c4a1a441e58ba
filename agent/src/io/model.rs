//! Model invocation boundary.
//!
//! The [`ModelClient`] trait decouples the orchestrator from the actual model
//! backend. [`CommandModel`] pipes a transcript to an external command; tests
//! use scripted clients that return predetermined replies.

use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::core::types::{Message, Role, ToolCall};
use crate::io::config::ModelConfig;
use crate::io::process::run_with_timeout;

static TOOL_CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<tool_call>(.*?)</tool_call>").expect("tool call pattern is valid")
});

/// Outcome of one model round trip.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelResponse {
    Completed {
        text: String,
        tool_calls: Vec<ToolCall>,
    },
    /// The backend reported failure. Ends the run gracefully.
    Failed { error: String },
}

impl ModelResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Completed {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }
}

/// Abstraction over model backends.
///
/// `Err` means the invocation itself broke (spawn failure, I/O error) and is
/// treated as a run-level failure. Ordinary backend failures should be
/// returned as [`ModelResponse::Failed`].
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, history: &[Message]) -> Result<ModelResponse>;
}

/// Single-prompt completion. A reported failure becomes an error.
pub async fn ask(model: &dyn ModelClient, prompt: &str) -> Result<String> {
    match model.complete(&[Message::user(prompt)]).await? {
        ModelResponse::Completed { text, .. } => Ok(text),
        ModelResponse::Failed { error } => Err(anyhow::anyhow!("model call failed: {error}")),
    }
}

/// Model backed by an external command (default `codex exec -`).
#[derive(Debug, Clone)]
pub struct CommandModel {
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandModel {
    pub fn new(config: &ModelConfig, timeout: Duration) -> Self {
        Self {
            command: config.command.clone(),
            timeout,
            output_limit_bytes: config.output_limit_bytes,
        }
    }
}

#[async_trait]
impl ModelClient for CommandModel {
    #[instrument(skip_all, fields(turns = history.len(), timeout_secs = self.timeout.as_secs()))]
    async fn complete(&self, history: &[Message]) -> Result<ModelResponse> {
        let transcript = render_transcript(history);
        let command = self.command.clone();
        let timeout = self.timeout;
        let limit = self.output_limit_bytes;
        let output = tokio::task::spawn_blocking(move || {
            run_with_timeout(&command, transcript.as_bytes(), timeout, limit)
        })
        .await
        .context("join model command")?
        .context("run model command")?;

        if output.timed_out {
            warn!("model command timed out");
            return Ok(ModelResponse::Failed {
                error: format!("model command timed out after {}s", timeout.as_secs()),
            });
        }
        if !output.success() {
            warn!(exit_code = ?output.exit_code(), "model command failed");
            let stderr = output.stderr.text();
            return Ok(ModelResponse::Failed {
                error: format!(
                    "model command exited with {:?}: {}",
                    output.exit_code(),
                    stderr.trim()
                ),
            });
        }
        let (text, tool_calls) = parse_reply(&output.stdout.text());
        debug!(tool_calls = tool_calls.len(), "model replied");
        Ok(ModelResponse::Completed { text, tool_calls })
    }
}

/// Flatten history into the plain-text transcript fed to the command.
pub fn render_transcript(history: &[Message]) -> String {
    let mut out = String::new();
    for message in history {
        let heading = match message.role {
            Role::User => "### user",
            Role::Assistant => "### assistant",
        };
        out.push_str(heading);
        out.push('\n');
        out.push_str(message.text.trim_end());
        out.push_str("\n\n");
    }
    out
}

/// Split a raw reply into visible text and requested tool calls.
///
/// Blocks whose body is not a JSON object with a `name` are dropped with a
/// warning.
pub fn parse_reply(raw: &str) -> (String, Vec<ToolCall>) {
    let mut calls = Vec::new();
    for caps in TOOL_CALL_RE.captures_iter(raw) {
        let body = caps.get(1).map_or("", |m| m.as_str()).trim();
        match serde_json::from_str::<ToolCall>(body) {
            Ok(call) if !call.name.trim().is_empty() => calls.push(normalize(call)),
            Ok(_) => warn!("tool call without a name ignored"),
            Err(err) => warn!(%err, "malformed tool call ignored"),
        }
    }
    let text = TOOL_CALL_RE.replace_all(raw, "").trim().to_string();
    (text, calls)
}

fn normalize(mut call: ToolCall) -> ToolCall {
    if call.arguments.is_null() {
        call.arguments = Value::Object(serde_json::Map::new());
    }
    call
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn transcript_labels_roles() {
        let history = vec![Message::user("build it"), Message::assistant("ok  \n")];
        assert_eq!(
            render_transcript(&history),
            "### user\nbuild it\n\n### assistant\nok\n\n"
        );
    }

    #[test]
    fn parse_reply_extracts_tool_calls() {
        let raw = "Planning edits.\n<tool_call>{\"name\":\"smart_edit\",\"arguments\":{\"project_path\":\"demo\"}}</tool_call>\nDone.";
        let (text, calls) = parse_reply(raw);
        assert_eq!(text, "Planning edits.\n\nDone.");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "smart_edit");
        assert_eq!(calls[0].arguments, json!({ "project_path": "demo" }));
    }

    #[test]
    fn parse_reply_skips_malformed_blocks() {
        let raw = "<tool_call>not json</tool_call><tool_call>{\"name\":\"\"}</tool_call><tool_call>{\"name\":\"x\"}</tool_call>";
        let (text, calls) = parse_reply(raw);
        assert!(text.is_empty());
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments, json!({}));
    }

    #[test]
    fn plain_reply_has_no_calls() {
        let (text, calls) = parse_reply("  just text  ");
        assert_eq!(text, "just text");
        assert!(calls.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_model_echoes_transcript() {
        let config = ModelConfig {
            command: vec!["cat".to_string()],
            output_limit_bytes: 4096,
        };
        let model = CommandModel::new(&config, Duration::from_secs(5));
        let response = model
            .complete(&[Message::user("hi")])
            .await
            .expect("complete");
        assert_eq!(response, ModelResponse::text("### user\nhi"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_reported_failure() {
        let config = ModelConfig {
            command: vec!["sh".to_string(), "-c".to_string(), "exit 4".to_string()],
            output_limit_bytes: 4096,
        };
        let model = CommandModel::new(&config, Duration::from_secs(5));
        let response = model.complete(&[]).await.expect("complete");
        assert!(matches!(response, ModelResponse::Failed { error } if error.contains("Some(4)")));
    }

    #[tokio::test]
    async fn missing_binary_is_an_error() {
        let config = ModelConfig {
            command: vec!["definitely-not-a-real-binary-xyz".to_string()],
            output_limit_bytes: 4096,
        };
        let model = CommandModel::new(&config, Duration::from_secs(5));
        assert!(model.complete(&[]).await.is_err());
        assert!(ask(&model, "hi").await.is_err());
    }
}
