//! Workflow engine — YAML-driven multi-step agent orchestration.
//!
//! Workflows are declared in YAML files as an ordered list of steps, each
//! bound to a named agent. Values may reference workflow inputs, earlier step
//! results and the environment with `{{...}}` expressions.
//!
//! # Architecture
//!
//! ```text
//! workflows/*.yaml ──► WorkflowCatalog ──► validator ──► WorkflowDefinition
//!                                                             │
//!                                                      WorkflowExecutor
//!                                                             │
//!                                 Resolver ◄──── register ── StepRunner
//!                                 (inputs, step results, env)  │
//!                                                         dyn Agent
//!                                                             │
//!                                            AgentRegistry / HttpAgent / EchoAgent
//! ```

pub mod agent;
pub mod catalog;
pub mod env;
pub mod executor;
pub mod expr;
pub mod http_agent;
pub mod resolver;
pub mod result;
pub mod schema;
pub mod step_runner;
pub mod validator;

pub use agent::{Agent, AgentError, AgentRegistry, EchoAgent, FnAgent};
pub use catalog::{DefinitionSummary, InputSummary, WorkflowCatalog};
pub use env::EnvSnapshot;
pub use executor::{WorkflowExecutor, WorkflowSource};
pub use http_agent::{AgentEndpoint, HttpAgent};
pub use resolver::{ReferenceMode, ResolveError, Resolver};
pub use result::{StepResult, StepStatus, WorkflowResult};
pub use schema::{
    InputSpec, InputType, OnError, OnWorkflowError, OutputSpec, RetryPolicy, StepSpec,
    WorkflowDefinition,
};
pub use step_runner::StepRunner;
pub use validator::{lint_references, validate, validate_definition};
