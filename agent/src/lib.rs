//! Multi-turn agent conversation engine.
//!
//! A conversation task runs a bounded loop of model turns. Each turn may
//! request tools; tool calls go through a validating, instrumented pipeline and
//! their observations are fed back to the model. Progress is reported as a
//! stream of events per task.
//!
//! - **[`core`]**: Pure, deterministic logic (estimation, continuation,
//!   budgets, plan parsing, schema validation). No I/O.
//! - **[`io`]**: Side-effecting collaborators (config, model process, event
//!   sinks, project analysis, prompts). Isolated behind traits for tests.
//!
//! [`orchestrator`] coordinates the [`registry`], the tool [`pipeline`], and
//! the registered [`tools`] to run a task end to end.

pub mod context;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod registry;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tools;
