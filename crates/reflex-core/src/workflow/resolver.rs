//! Variable resolver — materializes `{{...}}` references against a run's
//! inputs, registered step results and the environment snapshot.
//!
//! Resolution is recursive over mappings and sequences (keys and element
//! order are preserved). A string that is exactly one reference resolves to
//! the referenced value with its native type; references embedded in text
//! are rendered to strings and spliced in.
//!
//! By default missing references resolve leniently to "no value" (`null`
//! in whole-string position, empty text when embedded). [`ReferenceMode::Strict`]
//! turns them into [`ResolveError::Unresolved`] for callers that prefer
//! failing fast.
//!
//! A resolver belongs to exactly one run and must not be reused.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::workflow::env::EnvSnapshot;
use crate::workflow::expr::{Reference, Segment, Template};
use crate::workflow::result::StepResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferenceMode {
    #[default]
    Lenient,
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("Unresolved reference '{0}'")]
    Unresolved(String),
}

pub struct Resolver {
    /// Frozen after default-application
    inputs: Map<String, Value>,
    /// Append-only view of `steps.<id>.*`
    steps: HashMap<String, StepResult>,
    env: Arc<EnvSnapshot>,
    mode: ReferenceMode,
}

impl Resolver {
    pub fn new(inputs: Map<String, Value>, env: Arc<EnvSnapshot>) -> Self {
        Self {
            inputs,
            steps: HashMap::new(),
            env,
            mode: ReferenceMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: ReferenceMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> ReferenceMode {
        self.mode
    }

    pub fn inputs(&self) -> &Map<String, Value> {
        &self.inputs
    }

    /// Register a finished step so later steps can reference it.
    ///
    /// Returns `false` (and keeps the existing entry) when a result for the
    /// same step id was already registered.
    pub fn register(&mut self, result: StepResult) -> bool {
        if self.steps.contains_key(&result.step_id) {
            tracing::warn!(
                "[Resolver] Ignoring second result for step '{}'",
                result.step_id
            );
            return false;
        }
        self.steps.insert(result.step_id.clone(), result);
        true
    }

    pub fn step_result(&self, step_id: &str) -> Option<&StepResult> {
        self.steps.get(step_id)
    }

    /// Look up a single reference. `None` means the reference does not
    /// point at anything (unknown root, step or key).
    pub fn lookup(&self, reference: &Reference) -> Option<Value> {
        match reference {
            Reference::WorkflowInput(name) => self.inputs.get(name).cloned(),
            Reference::StepOutput(id) => self.steps.get(id).map(|r| r.output.clone()),
            Reference::StepNamedOutput { step, name } => self
                .steps
                .get(step)
                .and_then(|r| r.outputs.get(name).cloned()),
            Reference::StepSuccess(id) => self.steps.get(id).map(|r| Value::Bool(r.is_success())),
            Reference::StepError(id) => self
                .steps
                .get(id)
                .map(|r| r.error.clone().map(Value::String).unwrap_or(Value::Null)),
            Reference::Env(name) => self.env.get(name).map(|v| Value::String(v.to_string())),
            Reference::Unknown(_) => None,
        }
    }

    /// Resolve leniently, regardless of the configured mode.
    pub fn resolve(&self, value: &Value) -> Value {
        match self.resolve_value(value, false) {
            Ok(v) => v,
            // Lenient resolution has no failure path.
            Err(_) => Value::Null,
        }
    }

    /// Resolve honoring the configured [`ReferenceMode`].
    pub fn try_resolve(&self, value: &Value) -> Result<Value, ResolveError> {
        self.resolve_value(value, self.mode == ReferenceMode::Strict)
    }

    fn resolve_value(&self, value: &Value, strict: bool) -> Result<Value, ResolveError> {
        match value {
            Value::String(s) => self.resolve_str(s, strict),
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve_value(item, strict))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut out = Map::new();
                for (key, item) in map {
                    out.insert(key.clone(), self.resolve_value(item, strict)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn resolve_str(&self, text: &str, strict: bool) -> Result<Value, ResolveError> {
        let template = Template::parse(text);
        if !template.has_references() {
            return Ok(Value::String(text.to_string()));
        }

        if let Some(expr) = template.single_reference() {
            return match self.lookup(&expr.reference) {
                Some(value) => Ok(value),
                None if strict => Err(ResolveError::Unresolved(expr.raw.clone())),
                None => {
                    tracing::debug!("[Resolver] '{}' resolved to no value", expr.raw);
                    Ok(Value::Null)
                }
            };
        }

        let mut out = String::with_capacity(text.len());
        for segment in template.segments() {
            match segment {
                Segment::Literal(literal) => out.push_str(literal),
                Segment::Reference(expr) => match self.lookup(&expr.reference) {
                    Some(value) => out.push_str(&render(&value)),
                    None if strict => return Err(ResolveError::Unresolved(expr.raw.clone())),
                    None => {
                        tracing::debug!("[Resolver] '{}' interpolated as empty", expr.raw);
                    }
                },
            }
        }
        Ok(Value::String(out))
    }
}

/// Render a value for string interpolation. `null` renders as empty text,
/// strings verbatim, everything else as compact JSON.
pub fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Truthiness used by step conditions.
///
/// Falsy: `null`, `false`, zero, empty collections, and strings that are
/// empty or spell `false`/`0`/`no` (case-insensitive, trimmed).
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => {
            let s = s.trim();
            !(s.is_empty()
                || s.eq_ignore_ascii_case("false")
                || s == "0"
                || s.eq_ignore_ascii_case("no"))
        }
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
