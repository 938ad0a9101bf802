//! Workflow Executor — runs a workflow definition step by step.
//!
//! The executor:
//! 1. Loads the definition (by catalog name, file or value) and validates it
//! 2. Seeds a fresh [`Resolver`] with caller inputs plus declared defaults
//! 3. Executes each step sequentially via the [`StepRunner`]
//! 4. Registers every step result so later steps can reference it
//! 5. Applies `on_workflow_error` and binds declared outputs
//!
//! `execute` never returns an error: load, validation and input problems are
//! reported through a `failed` [`WorkflowResult`] with no step results.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::config::EngineConfig;
use crate::error::WorkflowError;
use crate::workflow::agent::Agent;
use crate::workflow::catalog::{load_file, DefinitionSummary, WorkflowCatalog};
use crate::workflow::env::EnvSnapshot;
use crate::workflow::resolver::{ReferenceMode, Resolver};
use crate::workflow::result::{StepResult, StepStatus, WorkflowResult};
use crate::workflow::schema::{OnWorkflowError, WorkflowDefinition};
use crate::workflow::step_runner::StepRunner;
use crate::workflow::validator;

/// What to execute.
#[derive(Debug, Clone)]
pub enum WorkflowSource {
    /// Looked up in the catalog
    Name(String),
    /// Read from a definition file
    File(PathBuf),
    /// Already loaded
    Definition(WorkflowDefinition),
}

impl WorkflowSource {
    fn label(&self) -> String {
        match self {
            WorkflowSource::Name(name) => name.clone(),
            WorkflowSource::File(path) => path.display().to_string(),
            WorkflowSource::Definition(definition) => definition.name.clone(),
        }
    }
}

impl From<&str> for WorkflowSource {
    fn from(name: &str) -> Self {
        WorkflowSource::Name(name.to_string())
    }
}

impl From<String> for WorkflowSource {
    fn from(name: String) -> Self {
        WorkflowSource::Name(name)
    }
}

impl From<PathBuf> for WorkflowSource {
    fn from(path: PathBuf) -> Self {
        WorkflowSource::File(path)
    }
}

impl From<WorkflowDefinition> for WorkflowSource {
    fn from(definition: WorkflowDefinition) -> Self {
        WorkflowSource::Definition(definition)
    }
}

/// The workflow executor engine.
///
/// Holds no per-run state; each `execute` call builds its own resolver, so
/// one executor can serve concurrent runs.
pub struct WorkflowExecutor {
    catalog: WorkflowCatalog,
    runner: StepRunner,
    env: Arc<EnvSnapshot>,
    mode: ReferenceMode,
}

impl WorkflowExecutor {
    /// Executor with the current process environment and lenient references.
    pub fn new(catalog: WorkflowCatalog, agent: Arc<dyn Agent>) -> Self {
        Self {
            catalog,
            runner: StepRunner::new(agent),
            env: Arc::new(EnvSnapshot::capture()),
            mode: ReferenceMode::Lenient,
        }
    }

    /// Executor wired from configuration: catalog dirs, dotenv files and
    /// reference mode.
    pub fn from_config(config: &EngineConfig, agent: Arc<dyn Agent>) -> Self {
        Self {
            catalog: config.catalog(),
            runner: StepRunner::new(agent),
            env: Arc::new(config.env_snapshot()),
            mode: config.reference_mode(),
        }
    }

    pub fn with_env(mut self, env: EnvSnapshot) -> Self {
        self.env = Arc::new(env);
        self
    }

    pub fn with_reference_mode(mut self, mode: ReferenceMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn catalog(&self) -> &WorkflowCatalog {
        &self.catalog
    }

    pub fn list_definitions(&self) -> Vec<DefinitionSummary> {
        self.catalog.list_definitions()
    }

    pub fn load_definition(&self, name: &str) -> Result<WorkflowDefinition, WorkflowError> {
        self.catalog.load_definition(name)
    }

    pub fn validate(&self, definition: &WorkflowDefinition) -> Vec<String> {
        validator::validate_definition(definition)
    }

    /// Load, validate and run a workflow.
    pub async fn execute(
        &self,
        source: impl Into<WorkflowSource>,
        inputs: Map<String, Value>,
    ) -> WorkflowResult {
        let source = source.into();
        let label = source.label();

        match self.prepare(source) {
            Ok(definition) => self.run(&definition, inputs).await,
            Err(e) => {
                tracing::warn!("[Workflow] Cannot run '{}': {}", label, e);
                WorkflowResult::begin(&label).finish(StepStatus::Failed, Some(e.to_string()))
            }
        }
    }

    fn prepare(&self, source: WorkflowSource) -> Result<WorkflowDefinition, WorkflowError> {
        let definition = match source {
            WorkflowSource::Name(name) => {
                let (_, document) = self.catalog.load_document(&name)?;
                from_document(document)?
            }
            WorkflowSource::File(path) => from_document(load_file(&path)?)?,
            WorkflowSource::Definition(definition) => definition,
        };

        Ok(definition)
    }

    /// Validate and run a definition. An invalid definition yields a failed
    /// result with no step results.
    pub async fn run(
        &self,
        definition: &WorkflowDefinition,
        inputs: Map<String, Value>,
    ) -> WorkflowResult {
        let mut result = WorkflowResult::begin(&definition.name);

        let errors = validator::validate_definition(definition);
        if !errors.is_empty() {
            let error = WorkflowError::invalid(&errors);
            tracing::warn!("[Workflow] Cannot run '{}': {}", definition.name, error);
            return result.finish(StepStatus::Failed, Some(error.to_string()));
        }

        tracing::info!(
            "[Workflow] Starting '{}' ({} steps, run {})",
            definition.name,
            definition.steps.len(),
            result.run_id
        );

        let inputs = match apply_input_defaults(definition, inputs) {
            Ok(inputs) => inputs,
            Err(message) => {
                tracing::warn!("[Workflow] '{}': {}", definition.name, message);
                return result.finish(StepStatus::Failed, Some(message));
            }
        };

        let mut resolver = Resolver::new(inputs, self.env.clone()).with_mode(self.mode);
        let mut stop_error = None;

        for (i, step) in definition.steps.iter().enumerate() {
            tracing::info!(
                "[Workflow] Step {}/{}: {}",
                i + 1,
                definition.steps.len(),
                step.display_name()
            );

            let step_result = self.runner.run_step(step, &resolver).await;
            tracing::info!(
                "[Workflow] Step '{}' finished: {} ({} ms)",
                step.id,
                step_result.status,
                step_result.duration_ms
            );

            let failed = step_result.status == StepStatus::Failed;
            let message = step_result.error.clone().unwrap_or_default();
            resolver.register(step_result.clone());
            result.step_results.push(step_result);

            if failed {
                match definition.on_workflow_error {
                    OnWorkflowError::Fail => {
                        stop_error = Some(format!("Step '{}' failed: {}", step.id, message));
                        break;
                    }
                    OnWorkflowError::Continue => {
                        tracing::warn!(
                            "[Workflow] Step '{}' failed, continuing: {}",
                            step.id,
                            message
                        );
                    }
                }
            }
        }

        result.outputs = bind_outputs(definition, result.step_results.last());

        let status = if stop_error.is_some() {
            StepStatus::Failed
        } else {
            StepStatus::Success
        };
        let result = result.finish(status, stop_error);
        tracing::info!(
            "[Workflow] '{}' {} in {} ms",
            definition.name,
            result.status,
            result.duration_ms
        );
        result
    }
}

/// Raw document to typed definition, rejecting anything the validator flags.
fn from_document(document: Value) -> Result<WorkflowDefinition, WorkflowError> {
    let errors = validator::validate(&document);
    if !errors.is_empty() {
        return Err(WorkflowError::invalid(&errors));
    }
    WorkflowDefinition::from_value(document)
}

/// Fill in declared defaults; every missing required input is reported.
fn apply_input_defaults(
    definition: &WorkflowDefinition,
    mut inputs: Map<String, Value>,
) -> Result<Map<String, Value>, String> {
    let mut missing = Vec::new();
    for spec in &definition.inputs {
        if inputs.contains_key(&spec.name) {
            continue;
        }
        match &spec.default {
            Some(default) => {
                inputs.insert(spec.name.clone(), default.clone());
            }
            None if spec.required => missing.push(spec.name.as_str()),
            None => {}
        }
    }

    if missing.is_empty() {
        Ok(inputs)
    } else {
        Err(format!("Missing required input(s): {}", missing.join(", ")))
    }
}

/// Declared outputs are read from the last step result only.
fn bind_outputs(definition: &WorkflowDefinition, last: Option<&StepResult>) -> Map<String, Value> {
    let mut outputs = Map::new();
    let Some(last) = last else {
        return outputs;
    };
    for spec in &definition.outputs {
        if let Some(value) = last.outputs.get(&spec.name) {
            outputs.insert(spec.name.clone(), value.clone());
        } else if !last.output.is_null() {
            outputs.insert(spec.name.clone(), last.output.clone());
        }
    }
    outputs
}
