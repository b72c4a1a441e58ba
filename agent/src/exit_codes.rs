//! Stable exit codes for the agent CLI.

/// Command succeeded; for `run`, the conversation completed.
pub const OK: i32 = 0;
/// Invalid arguments or config, or any other error before a run starts.
pub const INVALID: i32 = 1;
/// The conversation ended in `FAILED` (model error or cancellation).
pub const FAILED: i32 = 2;
