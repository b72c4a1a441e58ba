//! Turn loop for one conversation task.
//!
//! [`Orchestrator::run`] owns a task from `PENDING` to a terminal state:
//! setup events, model turns with interleaved tool calls, continuation and
//! budget checks, then finalization. A run ends in one of two ways:
//!
//! - **Graceful**: policy stop, turn cap, reported turn failure, or total
//!   timeout. A [`ConversationResult`] is stored and the task is `COMPLETED`.
//! - **Failed**: the model invocation errored or the task was cancelled. The
//!   task is `FAILED` and no result is stored.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::context::TaskContext;
use crate::core::budget::RunBudget;
use crate::core::continuation::{self, CompletionMarkerPolicy, ContinuationPolicy};
use crate::core::schema::ParamValidator;
use crate::core::types::{
    ConversationResult, Message, Task, TaskError, TaskId, TaskState, ToolCall, ToolResult,
    TurnResult,
};
use crate::io::events::{EventSink, StepStatus};
use crate::io::model::{ModelClient, ModelResponse};
use crate::io::prompt::PromptEngine;
use crate::pipeline::{ToolInvocationPipeline, ToolStatsSnapshot};
use crate::registry::{CANCELLED, TaskRegistry};
use crate::tools::ToolRegistry;

/// Stop reason recorded when the whole-run budget runs out.
pub const TOTAL_TIMEOUT_REASON: &str = "total conversation timeout expired";

const PLAN_SUMMARY: &str =
    "execution plan: analyze project structure -> create required files -> implement core features -> verify";
const ACTION_PREVIEW_CHARS: usize = 100;

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(ConversationResult),
    /// Run-level failure; the task is `FAILED` and has no stored result.
    Failed { error: String },
}

impl RunOutcome {
    pub fn result(&self) -> Option<&ConversationResult> {
        match self {
            Self::Completed(result) => Some(result),
            Self::Failed { .. } => None,
        }
    }
}

/// Mutable state owned by a single run.
#[derive(Debug, Default)]
struct RunState {
    history: Vec<Message>,
    full_response: String,
    turn_responses: Vec<String>,
    turns: u32,
    stop_reason: Option<String>,
}

impl RunState {
    fn push_response(&mut self, text: &str) {
        if !self.full_response.is_empty() {
            self.full_response.push_str("\n\n");
        }
        self.full_response.push_str(text);
        self.turn_responses.push(text.to_string());
    }
}

enum LoopExit {
    Finished,
    Cancelled,
}

pub struct Orchestrator {
    registry: Arc<TaskRegistry>,
    model: Arc<dyn ModelClient>,
    tools: ToolRegistry,
    pipeline: ToolInvocationPipeline,
    sink: Arc<dyn EventSink>,
    policy: Arc<dyn ContinuationPolicy>,
    budget: RunBudget,
    prompts: Arc<PromptEngine>,
    plan_delay: Duration,
}

impl Orchestrator {
    pub fn new(model: Arc<dyn ModelClient>, sink: Arc<dyn EventSink>) -> Result<Self> {
        Ok(Self {
            registry: Arc::new(TaskRegistry::new()),
            model,
            tools: ToolRegistry::new(),
            pipeline: ToolInvocationPipeline::default(),
            sink,
            policy: Arc::new(CompletionMarkerPolicy),
            budget: RunBudget::default(),
            prompts: Arc::new(PromptEngine::new()?),
            plan_delay: Duration::ZERO,
        })
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn ContinuationPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_budget(mut self, budget: RunBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_validator(mut self, validator: Box<dyn ParamValidator>) -> Self {
        self.pipeline = ToolInvocationPipeline::new(validator);
        self
    }

    pub fn with_prompts(mut self, prompts: Arc<PromptEngine>) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_plan_delay(mut self, delay: Duration) -> Self {
        self.plan_delay = delay;
        self
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn budget(&self) -> RunBudget {
        self.budget
    }

    /// Allocate a `PENDING` task for `text`.
    pub fn start_task(&self, text: &str) -> TaskId {
        self.registry.create(text)
    }

    pub fn status(&self, task_id: &str) -> Option<Task> {
        self.registry.get(task_id)
    }

    pub fn result(&self, task_id: &str) -> Option<ConversationResult> {
        self.registry.result(task_id)
    }

    /// Returns `Ok(false)` when the task had already finished.
    ///
    /// A running task reports its own failure once the loop notices. A task
    /// cancelled while `PENDING` has no run to do that, so its failure event
    /// is emitted here and its event stream closed.
    pub fn cancel(&self, task_id: &str) -> Result<bool, TaskError> {
        match self.registry.cancel_from(task_id)? {
            Some(TaskState::Pending) => {
                TaskContext::new(task_id, Arc::clone(&self.sink)).task_failed(CANCELLED);
                Ok(true)
            }
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }

    pub fn tool_stats(&self) -> Vec<ToolStatsSnapshot> {
        self.pipeline.stats().snapshot()
    }

    pub fn log_tool_stats(&self) {
        self.pipeline.stats().log_report();
    }

    /// Drive the task to a terminal state.
    ///
    /// Returns `Err` only when the run cannot start: [`TaskError::NotFound`]
    /// for unknown ids (nothing is emitted or created), or
    /// [`TaskError::InvalidTransition`] when the task is not `PENDING`.
    #[instrument(skip_all, fields(%task_id))]
    pub async fn run(
        &self,
        task_id: &str,
        initial_message: &str,
        seed: &[Message],
    ) -> Result<RunOutcome> {
        if !self.registry.contains(task_id) {
            return Err(TaskError::NotFound(task_id.to_string()).into());
        }
        let opening = self
            .prompts
            .render_task(initial_message, &self.tools.summaries())
            .context("render task prompt")?;
        self.registry.update(task_id, |task| {
            task.transition(TaskState::Running)?;
            task.current_turn = 0;
            task.current_action = "analyzing the request".to_string();
            Ok::<_, TaskError>(())
        })??;
        info!(initial_message, "conversation started");

        let ctx = TaskContext::new(task_id, Arc::clone(&self.sink));
        self.emit_setup(&ctx, initial_message).await;

        let mut state = RunState {
            history: seed.to_vec(),
            ..RunState::default()
        };
        state.history.push(Message::user(opening));

        let started = Instant::now();
        let exit = self.drive(&ctx, &mut state, started).await;
        let elapsed = started.elapsed();

        match exit {
            Ok(LoopExit::Finished) => Ok(self.finalize(&ctx, state, elapsed)),
            Ok(LoopExit::Cancelled) => {
                info!(turns = state.turns, "run observed cancellation");
                ctx.task_failed(CANCELLED);
                Ok(RunOutcome::Failed {
                    error: CANCELLED.to_string(),
                })
            }
            Err(err) => {
                let error = format!("{err:#}");
                warn!(turn = state.turns, %error, "conversation aborted");
                let entry = format!("❌ error in turn {}: {error}", state.turns);
                if let Err(fail_err) = self.registry.fail(task_id, &error) {
                    warn!(%fail_err, "could not record failure");
                }
                if let Err(update_err) = self.registry.update(task_id, |task| {
                    if task.error_message.as_deref() == Some(error.as_str()) {
                        task.current_action = entry;
                    }
                }) {
                    warn!(%update_err, "could not record failed turn");
                }
                ctx.task_failed(&error);
                Ok(RunOutcome::Failed { error })
            }
        }
    }

    async fn emit_setup(&self, ctx: &TaskContext, initial_message: &str) {
        ctx.task_analysis_start(initial_message);
        ctx.analysis_step(
            "requirement understanding",
            "understanding the request",
            StepStatus::Analyzing,
        );
        ctx.analysis_step(
            "requirement analysis",
            "requirements analyzed, drafting the execution plan",
            StepStatus::Completed,
        );
        ctx.analysis_step(
            "execution plan",
            "generating the execution plan",
            StepStatus::Analyzing,
        );
        if !self.plan_delay.is_zero() {
            tokio::time::sleep(self.plan_delay).await;
        }
        ctx.execution_plan(PLAN_SUMMARY);
    }

    /// The turn loop. `Err` is a run-level failure.
    async fn drive(
        &self,
        ctx: &TaskContext,
        state: &mut RunState,
        started: Instant,
    ) -> Result<LoopExit> {
        let task_id = ctx.task_id();
        while state.turns < self.budget.max_turns {
            if self.registry.is_cancelled(task_id) {
                return Ok(LoopExit::Cancelled);
            }
            state.turns += 1;
            let turn = state.turns;
            self.registry.update(task_id, |task| {
                task.current_turn = turn;
                task.current_action = format!("running turn {turn}");
            })?;

            if self.budget.total_expired(started) {
                warn!(turn, elapsed_ms = elapsed_ms(started), "total budget exhausted");
                state.stop_reason = Some(TOTAL_TIMEOUT_REASON.to_string());
                break;
            }

            // The total budget is only checked between turns; a call in
            // flight at the deadline completes and its reply is kept.
            let response = self
                .model
                .complete(&state.history)
                .await
                .with_context(|| format!("model call in turn {turn}"))?;

            let (outcome, tool_calls) = into_turn(response);
            let text = match outcome {
                TurnResult::Failed { error_message } => {
                    warn!(turn, %error_message, "turn failed");
                    state.stop_reason = Some(format!("turn execution failed: {error_message}"));
                    break;
                }
                TurnResult::Succeeded { response_text } => response_text.trim().to_string(),
            };

            if !text.is_empty() {
                state.history.push(Message::assistant(text.clone()));
                state.push_response(&text);
                let preview = preview(&text);
                self.registry.update(task_id, |task| {
                    task.current_action = format!("turn {turn} done: {preview}");
                })?;
            }
            debug!(turn, chars = text.len(), tools = tool_calls.len(), "turn completed");

            for call in tool_calls {
                if self.registry.is_cancelled(task_id) {
                    return Ok(LoopExit::Cancelled);
                }
                let result = self.invoke_tool(ctx, &call).await;
                state
                    .history
                    .push(Message::user(observation(&call.name, &result)));
            }

            let keep_going = continuation::should_continue(
                self.policy.as_ref(),
                self.budget.max_turns,
                &state.history,
                turn,
                Some(&text),
            );
            if !keep_going {
                debug!(turn, "continuation policy stopped the run");
                break;
            }
            let prompt = self.prompts.render_continue(turn + 1, self.budget.max_turns)?;
            state.history.push(Message::user(prompt));
        }
        Ok(LoopExit::Finished)
    }

    async fn invoke_tool(&self, ctx: &TaskContext, call: &ToolCall) -> ToolResult {
        match self.tools.get(&call.name) {
            Some(tool) => {
                self.pipeline
                    .invoke(tool.as_ref(), call.arguments.clone(), Some(ctx))
                    .await
            }
            None => {
                warn!(tool = %call.name, "model requested an unknown tool");
                ToolResult::error(format!("unknown tool: {}", call.name))
            }
        }
    }

    fn finalize(&self, ctx: &TaskContext, state: RunState, elapsed: Duration) -> RunOutcome {
        let task_id = ctx.task_id();
        let total_duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let result = ConversationResult {
            full_response: state.full_response,
            turn_responses: state.turn_responses,
            final_history: state.history,
            total_turns: state.turns,
            reached_turn_limit: self.budget.reached_turn_limit(state.turns),
            stop_reason: state.stop_reason,
            total_duration_ms,
        };
        let mut summary = format!(
            "Conversation finished after {} turn(s) in {:.1}s",
            result.total_turns,
            elapsed.as_secs_f64()
        );
        if let Some(reason) = &result.stop_reason {
            summary.push_str(", stop reason: ");
            summary.push_str(reason);
        }
        info!(
            turns = result.total_turns,
            duration_ms = total_duration_ms,
            stop_reason = result.stop_reason.as_deref().unwrap_or("none"),
            "conversation finished"
        );
        match self.registry.finish(task_id, result.clone(), summary.clone()) {
            Ok(()) => {
                ctx.task_complete(&summary);
                RunOutcome::Completed(result)
            }
            Err(err) => {
                // Cancelled while the final turn was in flight.
                warn!(%err, "result discarded");
                ctx.task_failed(CANCELLED);
                RunOutcome::Failed {
                    error: CANCELLED.to_string(),
                }
            }
        }
    }
}

fn into_turn(response: ModelResponse) -> (TurnResult, Vec<ToolCall>) {
    match response {
        ModelResponse::Completed { text, tool_calls } => (
            TurnResult::Succeeded {
                response_text: text,
            },
            tool_calls,
        ),
        ModelResponse::Failed { error } => (
            TurnResult::Failed {
                error_message: error,
            },
            Vec::new(),
        ),
    }
}

/// History entry carrying a tool's observation back to the model.
fn observation(tool: &str, result: &ToolResult) -> String {
    let verdict = if result.is_success() { "result" } else { "failed" };
    format!("Tool {tool} {verdict}:\n{}", result.observation())
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(ACTION_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
