//! Reflex Core — declarative workflow execution engine.
//!
//! A workflow is a YAML document listing steps to run in order against
//! external agents. This crate loads and validates definitions, resolves
//! `{{...}}` references between steps and runs them with per-step
//! retry/skip/fail policies. It has no opinion on how agents are reached:
//! hosts inject an [`workflow::Agent`] implementation.
//!
//! Used by:
//!
//! - the `reflex` CLI (`reflex-cli`)
//! - any host embedding [`WorkflowExecutor`] directly

pub mod config;
pub mod error;
pub mod workflow;

// Convenience re-exports
pub use config::EngineConfig;
pub use error::WorkflowError;
pub use workflow::{WorkflowDefinition, WorkflowExecutor, WorkflowResult};
