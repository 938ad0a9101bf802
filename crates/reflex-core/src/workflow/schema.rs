//! Typed definition model for workflow documents.
//!
//! A workflow document declares inputs, an ordered list of steps, the
//! outputs to surface at the end of a run, and a workflow-level error
//! policy:
//!
//! ```yaml
//! version: "1.0"
//! name: research
//! description: "Research a topic and summarize it"
//!
//! inputs:
//!   - name: topic
//!     type: string
//!     required: true
//!   - name: depth
//!     type: integer
//!     default: 2
//!
//! steps:
//!   - id: search
//!     agent: web
//!     action: "Search for {{workflow.inputs.topic}}"
//!     inputs:
//!       depth: "{{workflow.inputs.depth}}"
//!     outputs:
//!       - links
//!     on_error: retry
//!     retry:
//!       max_attempts: 3
//!       delay_seconds: 2
//!
//!   - id: summarize
//!     agent: writer
//!     action: "Summarize the findings"
//!     condition: "{{steps.search.success}}"
//!     inputs:
//!       links: "{{steps.search.outputs.links}}"
//!     outputs:
//!       - name: summary
//!
//! outputs:
//!   - name: summary
//!     description: "Final summary"
//!
//! on_workflow_error: fail
//! ```
//!
//! Documents are first parsed into a loosely-typed `serde_json::Value` so the
//! validator can inspect the raw shape; [`WorkflowDefinition::from_value`] is
//! the single conversion point into the typed model.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::WorkflowError;

/// Top-level workflow definition. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Workflow name (unique within a catalog)
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Document version string
    #[serde(default = "default_version", deserialize_with = "string_or_number")]
    pub version: String,

    /// Declared inputs, in declaration order
    #[serde(default)]
    pub inputs: Vec<InputSpec>,

    /// Declared workflow outputs, bound from the last step result
    #[serde(default)]
    pub outputs: Vec<OutputSpec>,

    /// Steps in execution order
    #[serde(default)]
    pub steps: Vec<StepSpec>,

    /// What to do when a step ends up `failed`
    #[serde(default)]
    pub on_workflow_error: OnWorkflowError,
}

fn default_version() -> String {
    "1.0".to_string()
}

/// Accept `version: 1.0` as well as `version: "1.0"`.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(default_version()),
        other => Err(serde::de::Error::custom(format!(
            "expected a version string, found {}",
            other
        ))),
    }
}

/// Type tag on a declared input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    #[default]
    #[serde(alias = "str")]
    String,
    #[serde(alias = "float")]
    Number,
    #[serde(alias = "int")]
    Integer,
    #[serde(alias = "bool")]
    Boolean,
    #[serde(alias = "map")]
    Object,
    #[serde(alias = "list")]
    Array,
    #[serde(other)]
    Any,
}

impl InputType {
    /// Convert command-line text into a value of this type.
    ///
    /// Falls back to the raw string when the text does not parse as the
    /// tagged type; caller-supplied values are never rejected on type.
    pub fn coerce(&self, raw: &str) -> Value {
        let text = raw.trim();
        let parsed = match self {
            InputType::String => None,
            InputType::Integer => text.parse::<i64>().ok().map(Value::from),
            InputType::Number => text
                .parse::<i64>()
                .ok()
                .map(Value::from)
                .or_else(|| {
                    text.parse::<f64>()
                        .ok()
                        .and_then(serde_json::Number::from_f64)
                        .map(Value::Number)
                }),
            InputType::Boolean => match text.to_ascii_lowercase().as_str() {
                "true" | "yes" | "y" | "1" | "on" => Some(Value::Bool(true)),
                "false" | "no" | "n" | "0" | "off" => Some(Value::Bool(false)),
                _ => None,
            },
            InputType::Object => serde_json::from_str::<Value>(text)
                .ok()
                .filter(Value::is_object),
            InputType::Array => serde_json::from_str::<Value>(text)
                .ok()
                .filter(Value::is_array),
            InputType::Any => serde_json::from_str::<Value>(text).ok(),
        };
        parsed.unwrap_or_else(|| Value::String(raw.to_string()))
    }
}

impl std::fmt::Display for OnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OnError::Fail => "fail",
            OnError::Skip => "skip",
            OnError::Retry => "retry",
        };
        write!(f, "{}", s)
    }
}

impl std::fmt::Display for InputType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InputType::String => "string",
            InputType::Number => "number",
            InputType::Integer => "integer",
            InputType::Boolean => "boolean",
            InputType::Object => "object",
            InputType::Array => "array",
            InputType::Any => "any",
        };
        write!(f, "{}", s)
    }
}

/// A declared workflow input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    pub name: String,

    #[serde(rename = "type", default)]
    pub input_type: InputType,

    #[serde(default)]
    pub required: bool,

    /// Applied when the caller does not supply the input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A named output, on a step or on the workflow.
///
/// Accepts either a bare string or a `{name, description}` mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "OutputDecl")]
pub struct OutputSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OutputDecl {
    Simple(String),
    Detailed {
        name: String,
        #[serde(default)]
        description: Option<String>,
    },
}

impl From<OutputDecl> for OutputSpec {
    fn from(decl: OutputDecl) -> Self {
        match decl {
            OutputDecl::Simple(name) => OutputSpec {
                name,
                description: None,
            },
            OutputDecl::Detailed { name, description } => OutputSpec { name, description },
        }
    }
}

/// Per-step policy once the agent invocation has failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    /// Record a `failed` result (default)
    #[default]
    Fail,
    /// Record a `skipped` result carrying the error
    Skip,
    /// Re-invoke up to `retry.max_attempts` times, then fail
    Retry,
}

/// Workflow-level policy for `failed` steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnWorkflowError {
    /// Stop the run at the first failed step (default)
    #[default]
    Fail,
    /// Keep executing subsequent steps
    Continue,
}

/// Retry budget, only consulted when `on_error: retry`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_delay_seconds")]
    pub delay_seconds: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_delay_seconds() -> f64 {
    1.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_seconds: default_delay_seconds(),
        }
    }
}

/// Upper bound for `retry.delay_seconds` and `timeout_seconds` (one year).
pub const MAX_POLICY_SECONDS: f64 = 365.0 * 24.0 * 60.0 * 60.0;

/// Seconds to a `Duration`, clamped to `MAX_POLICY_SECONDS`.
/// `None` for zero, negative or non-finite values.
fn policy_duration(seconds: f64) -> Option<Duration> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(seconds.min(MAX_POLICY_SECONDS)).ok()
}

impl RetryPolicy {
    /// Delay between attempts. Negative or non-finite values mean no delay.
    pub fn delay(&self) -> Duration {
        policy_duration(self.delay_seconds).unwrap_or(Duration::ZERO)
    }
}

/// A single step of the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    /// Unique within the workflow; referenced as `steps.<id>.*`
    #[serde(default)]
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Logical agent identifier
    #[serde(default)]
    pub agent: String,

    /// Instruction text; may contain `{{...}}` references
    #[serde(default)]
    pub action: String,

    /// Agent inputs; values may contain `{{...}}` references
    #[serde(default)]
    pub inputs: Map<String, Value>,

    /// Keys of the agent's result map surfaced as named outputs
    #[serde(default)]
    pub outputs: Vec<OutputSpec>,

    /// Skip the step when this resolves falsy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Value>,

    #[serde(default)]
    pub on_error: OnError,

    #[serde(default)]
    pub retry: RetryPolicy,

    /// Deadline for a single agent invocation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<f64>,
}

impl StepSpec {
    /// Name for display, falling back to the id.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// Number of agent invocations this step may make.
    pub fn max_attempts(&self) -> u32 {
        match self.on_error {
            OnError::Retry => self.retry.max_attempts.max(1),
            _ => 1,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.and_then(policy_duration)
    }
}

/// Parse a YAML (or JSON) document into an untyped value tree.
pub fn parse_document(yaml: &str) -> Result<Value, WorkflowError> {
    let value: Value = serde_yaml::from_str(yaml)?;
    Ok(value)
}

impl WorkflowDefinition {
    /// Convert a raw document into the typed model.
    pub fn from_value(document: Value) -> Result<Self, WorkflowError> {
        serde_json::from_value(document)
            .map_err(|e| WorkflowError::Parse(format!("Invalid workflow document: {}", e)))
    }

    /// Parse a workflow definition from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, WorkflowError> {
        Self::from_value(parse_document(yaml)?)
    }

    /// Load a workflow definition from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, WorkflowError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            WorkflowError::Io(format!(
                "Failed to read workflow file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    /// Serialize back to YAML.
    pub fn to_yaml(&self) -> Result<String, WorkflowError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Look up a step by id.
    pub fn step(&self, id: &str) -> Option<&StepSpec> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Declared input by name.
    pub fn input(&self, name: &str) -> Option<&InputSpec> {
        self.inputs.iter().find(|i| i.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_minimal_workflow() {
        let yaml = r#"
name: "t1"
steps:
  - id: s1
    agent: x
    action: "do {{workflow.inputs.topic}}"
"#;
        let wf = WorkflowDefinition::from_yaml(yaml).unwrap();
        assert_eq!(wf.name, "t1");
        assert_eq!(wf.version, "1.0");
        assert_eq!(wf.steps.len(), 1);
        assert_eq!(wf.steps[0].on_error, OnError::Fail);
        assert_eq!(wf.steps[0].max_attempts(), 1);
        assert_eq!(wf.on_workflow_error, OnWorkflowError::Fail);
        assert_eq!(wf.steps[0].display_name(), "s1");
    }

    #[test]
    fn test_parse_full_workflow() {
        let yaml = r#"
version: 2
name: research
description: "Research a topic"
inputs:
  - name: topic
    required: true
  - name: depth
    type: integer
    default: 2
outputs:
  - name: summary
    description: "Final summary"
steps:
  - id: search
    name: "Search the web"
    agent: web
    action: "Search for {{workflow.inputs.topic}}"
    inputs:
      depth: "{{workflow.inputs.depth}}"
    outputs:
      - links
      - name: count
    on_error: retry
    retry:
      max_attempts: 5
      delay_seconds: 0.5
    timeout_seconds: 30
  - id: summarize
    agent: writer
    action: "Summarize"
    condition: "{{steps.search.success}}"
    on_error: skip
on_workflow_error: continue
"#;
        let wf = WorkflowDefinition::from_yaml(yaml).unwrap();
        assert_eq!(wf.version, "2");
        assert_eq!(wf.inputs[0].input_type, InputType::String);
        assert!(wf.inputs[0].required);
        assert_eq!(wf.inputs[1].default, Some(json!(2)));
        assert_eq!(wf.outputs[0].description.as_deref(), Some("Final summary"));

        let search = wf.step("search").unwrap();
        assert_eq!(search.display_name(), "Search the web");
        assert_eq!(search.outputs.len(), 2);
        assert_eq!(search.outputs[0].name, "links");
        assert_eq!(search.outputs[1].name, "count");
        assert_eq!(search.max_attempts(), 5);
        assert_eq!(search.retry.delay(), Duration::from_millis(500));
        assert_eq!(search.timeout(), Some(Duration::from_secs(30)));

        let summarize = wf.step("summarize").unwrap();
        assert_eq!(summarize.on_error, OnError::Skip);
        assert_eq!(summarize.condition, Some(json!("{{steps.search.success}}")));
        assert_eq!(wf.on_workflow_error, OnWorkflowError::Continue);
    }

    #[test]
    fn test_retry_defaults() {
        let yaml = r#"
name: r
steps:
  - id: a
    agent: x
    action: go
    on_error: retry
"#;
        let wf = WorkflowDefinition::from_yaml(yaml).unwrap();
        assert_eq!(wf.steps[0].retry, RetryPolicy::default());
        assert_eq!(wf.steps[0].max_attempts(), 3);
    }

    #[test]
    fn test_oversized_durations_are_clamped() {
        let retry = RetryPolicy {
            max_attempts: 2,
            delay_seconds: 1.0e20,
        };
        let year = Duration::from_secs_f64(MAX_POLICY_SECONDS);
        assert_eq!(retry.delay(), year);

        let yaml = "id: a\nagent: x\naction: go\ntimeout_seconds: 1.0e20";
        let mut step: StepSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(step.timeout(), Some(year));
        step.timeout_seconds = Some(f64::NAN);
        assert_eq!(step.timeout(), None);
        step.timeout_seconds = Some(-1.0);
        assert_eq!(step.timeout(), None);
    }

    #[test]
    fn test_on_error_display() {
        assert_eq!(OnError::Fail.to_string(), "fail");
        assert_eq!(OnError::Skip.to_string(), "skip");
        assert_eq!(OnError::Retry.to_string(), "retry");
    }

    #[test]
    fn test_unknown_policy_is_a_parse_error() {
        let yaml = r#"
name: r
steps:
  - id: a
    agent: x
    action: go
    on_error: explode
"#;
        let err = WorkflowDefinition::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, WorkflowError::Parse(_)));
    }

    #[test]
    fn test_input_type_coerce() {
        assert_eq!(InputType::Integer.coerce("42"), json!(42));
        assert_eq!(InputType::Integer.coerce("forty"), json!("forty"));
        assert_eq!(InputType::Number.coerce("1.5"), json!(1.5));
        assert_eq!(InputType::Boolean.coerce("yes"), json!(true));
        assert_eq!(InputType::Object.coerce(r#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(InputType::Array.coerce(r#"{"a":1}"#), json!(r#"{"a":1}"#));
        assert_eq!(InputType::String.coerce("7"), json!("7"));
        assert_eq!(InputType::Any.coerce("[1,2]"), json!([1, 2]));
    }

    #[test]
    fn test_unknown_input_type_is_any() {
        let yaml = r#"
name: r
inputs:
  - name: blob
    type: whatever
steps: []
"#;
        let wf = WorkflowDefinition::from_yaml(yaml).unwrap();
        assert_eq!(wf.inputs[0].input_type, InputType::Any);
    }

    #[test]
    fn test_yaml_round_trip_keeps_steps() {
        let wf = WorkflowDefinition::from_yaml(
            "name: rt\nsteps:\n  - id: a\n    agent: x\n    action: go\n",
        )
        .unwrap();
        let again = WorkflowDefinition::from_yaml(&wf.to_yaml().unwrap()).unwrap();
        assert_eq!(wf, again);
    }
}
