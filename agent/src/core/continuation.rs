//! Continuation policy: decides whether another turn should run.

use crate::core::types::Message;

/// Phrases that signal the model considers the task finished.
pub const COMPLETION_MARKERS: &[&str] = &["task_complete", "task complete", "all done"];

/// Pluggable decision consulted after each turn.
///
/// The turn cap is enforced by [`should_continue`] before any policy runs, so
/// implementations never need to guarantee termination themselves.
pub trait ContinuationPolicy: Send + Sync {
    fn should_continue(&self, history: &[Message], turn_count: u32, last_response: Option<&str>)
    -> bool;
}

/// Continue until the latest response carries an explicit completion marker.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompletionMarkerPolicy;

impl ContinuationPolicy for CompletionMarkerPolicy {
    fn should_continue(
        &self,
        _history: &[Message],
        _turn_count: u32,
        last_response: Option<&str>,
    ) -> bool {
        let Some(response) = last_response else {
            return true;
        };
        !contains_completion_marker(response)
    }
}

pub fn contains_completion_marker(text: &str) -> bool {
    let lower = text.to_lowercase();
    COMPLETION_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Apply the hard turn cap, then consult `policy`.
pub fn should_continue(
    policy: &dyn ContinuationPolicy,
    max_turns: u32,
    history: &[Message],
    turn_count: u32,
    last_response: Option<&str>,
) -> bool {
    if turn_count >= max_turns {
        return false;
    }
    policy.should_continue(history, turn_count, last_response)
}
