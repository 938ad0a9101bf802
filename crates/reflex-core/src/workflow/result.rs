//! Run results: one `StepResult` per attempted or skipped step, aggregated
//! into a `WorkflowResult`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle status shared by steps and whole runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Success => "success",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of a single step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub status: StepStatus,

    /// Raw value returned by the agent (`null` when none)
    #[serde(default)]
    pub output: Value,

    /// Declared outputs picked from `output`
    #[serde(default)]
    pub outputs: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub duration_ms: u64,

    /// Agent invocations made for this step
    #[serde(default)]
    pub attempts: u32,
}

impl StepResult {
    pub fn success(step_id: &str, output: Value, outputs: Map<String, Value>) -> Self {
        Self {
            step_id: step_id.to_string(),
            status: StepStatus::Success,
            output,
            outputs,
            error: None,
            duration_ms: 0,
            attempts: 0,
        }
    }

    pub fn failed(step_id: &str, error: impl Into<String>) -> Self {
        Self {
            step_id: step_id.to_string(),
            status: StepStatus::Failed,
            output: Value::Null,
            outputs: Map::new(),
            error: Some(error.into()),
            duration_ms: 0,
            attempts: 0,
        }
    }

    /// A skipped step; `error` is set when the skip came from `on_error: skip`.
    pub fn skipped(step_id: &str, error: Option<String>) -> Self {
        Self {
            step_id: step_id.to_string(),
            status: StepStatus::Skipped,
            output: Value::Null,
            outputs: Map::new(),
            error,
            duration_ms: 0,
            attempts: 0,
        }
    }

    pub fn with_timing(mut self, duration_ms: u64, attempts: u32) -> Self {
        self.duration_ms = duration_ms;
        self.attempts = attempts;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub run_id: String,
    pub workflow_name: String,
    /// `Success` or `Failed`
    pub status: StepStatus,
    pub step_results: Vec<StepResult>,
    pub outputs: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl WorkflowResult {
    /// A run that has started but not completed; status is provisional.
    pub(crate) fn begin(workflow_name: &str) -> Self {
        let now = Utc::now();
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            workflow_name: workflow_name.to_string(),
            status: StepStatus::Running,
            step_results: Vec::new(),
            outputs: Map::new(),
            error: None,
            started_at: now,
            completed_at: now,
            duration_ms: 0,
        }
    }

    /// Stamp completion time and final status.
    pub(crate) fn finish(mut self, status: StepStatus, error: Option<String>) -> Self {
        self.status = status;
        self.error = error;
        self.completed_at = Utc::now();
        self.duration_ms = self.compute_duration_ms();
        self
    }

    fn compute_duration_ms(&self) -> u64 {
        (self.completed_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }

    /// Result for a step id, if it produced one.
    pub fn step(&self, step_id: &str) -> Option<&StepResult> {
        self.step_results.iter().find(|r| r.step_id == step_id)
    }

    /// Ids of steps that ended `failed`.
    pub fn failed_steps(&self) -> Vec<&str> {
        self.step_results
            .iter()
            .filter(|r| r.status == StepStatus::Failed)
            .map(|r| r.step_id.as_str())
            .collect()
    }
}
