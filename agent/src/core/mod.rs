//! Deterministic, pure logic shared by the agent engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod budget;
pub mod complexity;
pub mod continuation;
pub mod plan;
pub mod schema;
pub mod types;
