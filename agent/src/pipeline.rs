//! Tool invocation wrapper: validation, timing, events, and counters.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::context::TaskContext;
use crate::core::schema::{ParamValidator, StrictValidator};
use crate::core::types::ToolResult;
use crate::tools::Tool;

#[derive(Debug, Default)]
struct ToolCounters {
    calls: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    total_ms: AtomicU64,
}

/// Point-in-time view of one tool's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolStatsSnapshot {
    pub tool: String,
    pub calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_ms: u64,
    pub average_ms: u64,
}

/// Monotonic per-tool counters. Never reset.
#[derive(Debug, Default)]
pub struct ToolStats {
    counters: Mutex<HashMap<String, Arc<ToolCounters>>>,
}

impl ToolStats {
    fn counters(&self, tool: &str) -> Arc<ToolCounters> {
        let mut map = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(map.entry(tool.to_string()).or_default())
    }

    pub fn record(&self, tool: &str, success: bool, elapsed: Duration) {
        let counters = self.counters(tool);
        counters.calls.fetch_add(1, Ordering::Relaxed);
        let outcome = if success {
            &counters.successes
        } else {
            &counters.failures
        };
        outcome.fetch_add(1, Ordering::Relaxed);
        let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        counters.total_ms.fetch_add(millis, Ordering::Relaxed);
    }

    /// Sorted by tool name.
    pub fn snapshot(&self) -> Vec<ToolStatsSnapshot> {
        let map = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let mut rows: Vec<ToolStatsSnapshot> = map
            .iter()
            .map(|(tool, c)| {
                let calls = c.calls.load(Ordering::Relaxed);
                let total_ms = c.total_ms.load(Ordering::Relaxed);
                ToolStatsSnapshot {
                    tool: tool.clone(),
                    calls,
                    successes: c.successes.load(Ordering::Relaxed),
                    failures: c.failures.load(Ordering::Relaxed),
                    total_ms,
                    average_ms: total_ms.checked_div(calls).unwrap_or(0),
                }
            })
            .collect();
        rows.sort_by(|a, b| a.tool.cmp(&b.tool));
        rows
    }

    /// One log line per tool.
    pub fn log_report(&self) {
        for row in self.snapshot() {
            info!(
                tool = %row.tool,
                calls = row.calls,
                successes = row.successes,
                failures = row.failures,
                average_ms = row.average_ms,
                "tool stats"
            );
        }
    }
}

/// Wraps every tool call with validation, events, and statistics.
pub struct ToolInvocationPipeline {
    validator: Box<dyn ParamValidator>,
    stats: ToolStats,
}

impl Default for ToolInvocationPipeline {
    fn default() -> Self {
        Self::new(Box::new(StrictValidator))
    }
}

impl ToolInvocationPipeline {
    pub fn new(validator: Box<dyn ParamValidator>) -> Self {
        Self {
            validator,
            stats: ToolStats::default(),
        }
    }

    pub fn stats(&self) -> &ToolStats {
        &self.stats
    }

    /// Run `tool` with `params`. Never fails: every outcome is a [`ToolResult`].
    ///
    /// Parameters that fail validation short-circuit before the tool body
    /// and before any event is emitted; the call still counts as a failure.
    #[instrument(skip_all, fields(tool = tool.name()))]
    pub async fn invoke(
        &self,
        tool: &dyn Tool,
        params: Value,
        ctx: Option<&TaskContext>,
    ) -> ToolResult {
        let name = tool.name();
        if let Some(message) = tool.validate(self.validator.as_ref(), &params) {
            warn!(%message, "tool parameters rejected");
            self.stats.record(name, false, Duration::ZERO);
            return ToolResult::error(message);
        }

        let started = Instant::now();
        if let Some(ctx) = ctx {
            ctx.tool_start(name, tool.subject(&params).as_deref());
        }

        let outcome = tool.execute(params, ctx).await;
        let elapsed = started.elapsed();
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

        let result = match outcome {
            Ok(result) => result,
            Err(err) => ToolResult::error(format!("{err:#}")),
        };
        self.stats.record(name, result.is_success(), elapsed);
        if let Some(ctx) = ctx {
            match &result {
                ToolResult::Success { display, .. } => {
                    ctx.tool_success(name, elapsed_ms, display.clone());
                }
                ToolResult::Error { message } => ctx.tool_error(name, elapsed_ms, message),
            }
        }
        result
    }
}
