//! Turn and wall-clock budgets for a conversation run.

use std::time::Duration;

use tokio::time::Instant;

/// Hard cap on turns per run.
pub const MAX_TURNS: u32 = 20;
/// Nominal budget for a single turn. The run loop never enforces it per
/// turn; the command-backed model uses it as its process timeout.
pub const TURN_TIMEOUT: Duration = Duration::from_secs(60);
/// The whole run may use this many turn budgets.
pub const TOTAL_TIMEOUT_MULTIPLIER: u32 = 10;
pub const TOTAL_TIMEOUT: Duration = Duration::from_secs(60 * 10);

/// Limits applied to one orchestrated run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunBudget {
    pub max_turns: u32,
    pub turn_timeout: Duration,
    pub total_timeout: Duration,
}

impl Default for RunBudget {
    fn default() -> Self {
        Self {
            max_turns: MAX_TURNS,
            turn_timeout: TURN_TIMEOUT,
            total_timeout: TOTAL_TIMEOUT,
        }
    }
}

impl RunBudget {
    /// Build a budget whose total is `multiplier` turn timeouts.
    pub fn new(max_turns: u32, turn_timeout: Duration, multiplier: u32) -> Self {
        Self {
            max_turns,
            turn_timeout,
            total_timeout: turn_timeout.saturating_mul(multiplier),
        }
    }

    /// True once the elapsed time since `started` exceeds the total budget.
    pub fn total_expired(&self, started: Instant) -> bool {
        started.elapsed() > self.total_timeout
    }

    pub fn reached_turn_limit(&self, turns: u32) -> bool {
        turns >= self.max_turns
    }
}
