//! Side-effecting collaborators: config files, child processes, the model
//! backend, event sinks, and project analysis.

pub mod config;
pub mod events;
pub mod model;
pub mod process;
pub mod project;
pub mod prompt;
