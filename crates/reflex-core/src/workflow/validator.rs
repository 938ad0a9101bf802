//! Static checks run before execution.
//!
//! Errors are accumulated rather than short-circuited so a caller sees every
//! problem at once. An empty list means the definition is safe to execute.
//!
//! [`lint_references`] is separate: it reports suspicious `{{...}}`
//! references as warnings and never blocks a run.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::workflow::expr::{Reference, Template};
use crate::workflow::schema::{OnError, WorkflowDefinition, MAX_POLICY_SECONDS};

const REQUIRED_STEP_FIELDS: [&str; 3] = ["id", "agent", "action"];

/// Validate a raw document (as parsed from YAML) before typed conversion.
pub fn validate(document: &Value) -> Vec<String> {
    let Some(root) = document.as_object() else {
        return vec!["Workflow definition must be a mapping".to_string()];
    };

    let mut errors = Vec::new();

    if !is_present_str(root.get("name")) {
        errors.push("Missing required field: name".to_string());
    }

    match root.get("steps") {
        None | Some(Value::Null) => errors.push("Missing required field: steps".to_string()),
        Some(Value::Array(steps)) if steps.is_empty() => {
            errors.push("Workflow must have at least one step".to_string())
        }
        Some(Value::Array(steps)) => {
            let mut ids = Vec::with_capacity(steps.len());
            for (i, step) in steps.iter().enumerate() {
                let Some(step) = step.as_object() else {
                    errors.push(format!("steps[{}]: step must be a mapping", i));
                    ids.push(None);
                    continue;
                };
                for field in REQUIRED_STEP_FIELDS {
                    if !is_present_str(step.get(field)) {
                        errors.push(format!("steps[{}]: missing required field '{}'", i, field));
                    }
                }
                ids.push(step.get("id").and_then(Value::as_str));
            }
            errors.extend(duplicate_ids(ids.into_iter()));
        }
        Some(_) => errors.push("Field 'steps' must be a list".to_string()),
    }

    if errors.is_empty() {
        match WorkflowDefinition::from_value(document.clone()) {
            Ok(definition) => errors.extend(policy_errors(&definition)),
            Err(e) => errors.push(e.to_string()),
        }
    }

    errors
}

/// Validate an already-typed definition with the same rules.
pub fn validate_definition(definition: &WorkflowDefinition) -> Vec<String> {
    let mut errors = Vec::new();

    if definition.name.trim().is_empty() {
        errors.push("Missing required field: name".to_string());
    }

    if definition.steps.is_empty() {
        errors.push("Workflow must have at least one step".to_string());
    }

    for (i, step) in definition.steps.iter().enumerate() {
        for (field, value) in [("id", &step.id), ("agent", &step.agent), ("action", &step.action)] {
            if value.trim().is_empty() {
                errors.push(format!("steps[{}]: missing required field '{}'", i, field));
            }
        }
    }
    errors.extend(duplicate_ids(
        definition.steps.iter().map(|s| Some(s.id.as_str())),
    ));
    errors.extend(policy_errors(definition));

    errors
}

fn is_present_str(value: Option<&Value>) -> bool {
    matches!(value, Some(Value::String(s)) if !s.trim().is_empty())
}

/// Flag every repeated step id by position.
fn duplicate_ids<'a>(ids: impl Iterator<Item = Option<&'a str>>) -> Vec<String> {
    let mut first_seen: HashMap<&str, usize> = HashMap::new();
    let mut errors = Vec::new();
    for (i, id) in ids.enumerate() {
        let Some(id) = id.filter(|id| !id.trim().is_empty()) else {
            continue;
        };
        match first_seen.get(id) {
            Some(first) => errors.push(format!(
                "steps[{}]: duplicate step id '{}' (first declared at steps[{}])",
                i, id, first
            )),
            None => {
                first_seen.insert(id, i);
            }
        }
    }
    errors
}

fn policy_errors(definition: &WorkflowDefinition) -> Vec<String> {
    let mut errors = Vec::new();
    for (i, step) in definition.steps.iter().enumerate() {
        if step.on_error == OnError::Retry && step.retry.max_attempts < 1 {
            errors.push(format!("steps[{}]: retry.max_attempts must be at least 1", i));
        }
        let delay = step.retry.delay_seconds;
        if !delay.is_finite() {
            errors.push(format!("steps[{}]: retry.delay_seconds must be a finite number", i));
        } else if delay < 0.0 {
            errors.push(format!("steps[{}]: retry.delay_seconds must not be negative", i));
        } else if delay > MAX_POLICY_SECONDS {
            errors.push(format!(
                "steps[{}]: retry.delay_seconds must not exceed {} seconds",
                i, MAX_POLICY_SECONDS
            ));
        }
        if let Some(timeout) = step.timeout_seconds {
            if !timeout.is_finite() || timeout <= 0.0 {
                errors.push(format!("steps[{}]: timeout_seconds must be a positive number", i));
            } else if timeout > MAX_POLICY_SECONDS {
                errors.push(format!(
                    "steps[{}]: timeout_seconds must not exceed {} seconds",
                    i, MAX_POLICY_SECONDS
                ));
            }
        }
    }
    errors
}

/// Non-fatal warnings about references that will resolve to no value.
pub fn lint_references(definition: &WorkflowDefinition) -> Vec<String> {
    let declared_inputs: HashSet<&str> =
        definition.inputs.iter().map(|i| i.name.as_str()).collect();
    let step_index: HashMap<&str, usize> = definition
        .steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();

    let mut warnings = Vec::new();
    for (i, step) in definition.steps.iter().enumerate() {
        let mut texts = vec![step.action.clone()];
        collect_strings(&Value::Object(step.inputs.clone()), &mut texts);
        if let Some(condition) = &step.condition {
            collect_strings(condition, &mut texts);
        }

        for text in &texts {
            for expr in Template::parse(text).references() {
                let location = format!("steps[{}] ('{}')", i, step.id);
                match &expr.reference {
                    Reference::Unknown(_) => warnings.push(format!(
                        "{}: unrecognized reference '{}'",
                        location, expr.raw
                    )),
                    Reference::WorkflowInput(name) if !declared_inputs.contains(name.as_str()) => {
                        warnings.push(format!(
                            "{}: '{}' refers to undeclared input '{}'",
                            location, expr.raw, name
                        ))
                    }
                    reference => {
                        let Some(target) = reference.step_id() else { continue };
                        match step_index.get(target) {
                            None => warnings.push(format!(
                                "{}: '{}' refers to unknown step '{}'",
                                location, expr.raw, target
                            )),
                            Some(&j) if j >= i => warnings.push(format!(
                                "{}: '{}' refers to step '{}' which has not run yet",
                                location, expr.raw, target
                            )),
                            Some(&j) => {
                                if let Reference::StepNamedOutput { name, .. } = reference {
                                    let declared = definition.steps[j]
                                        .outputs
                                        .iter()
                                        .any(|o| &o.name == name);
                                    if !declared {
                                        warnings.push(format!(
                                            "{}: '{}' reads output '{}' not declared by step '{}'",
                                            location, expr.raw, name, target
                                        ));
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }
    warnings
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::schema::parse_document;

    fn raw(yaml: &str) -> Value {
        parse_document(yaml).unwrap()
    }

    #[test]
    fn test_valid_document() {
        let doc = raw("name: ok\nsteps:\n  - id: a\n    agent: x\n    action: go\n");
        assert!(validate(&doc).is_empty());
    }

    #[test]
    fn test_errors_are_accumulated() {
        let doc = raw(r#"
description: "no name"
steps:
  - id: a
    agent: x
  - agent: y
    action: go
  - id: a
    agent: z
    action: go
  - "not a mapping"
"#);
        let errors = validate(&doc);
        assert_eq!(
            errors,
            vec![
                "Missing required field: name".to_string(),
                "steps[0]: missing required field 'action'".to_string(),
                "steps[1]: missing required field 'id'".to_string(),
                "steps[3]: step must be a mapping".to_string(),
                "steps[2]: duplicate step id 'a' (first declared at steps[0])".to_string(),
            ]
        );
    }

    #[test]
    fn test_steps_shape() {
        assert_eq!(validate(&raw("name: x")), vec!["Missing required field: steps"]);
        assert_eq!(
            validate(&raw("name: x\nsteps: []")),
            vec!["Workflow must have at least one step"]
        );
        assert_eq!(
            validate(&raw("name: x\nsteps: {a: 1}")),
            vec!["Field 'steps' must be a list"]
        );
        assert_eq!(
            validate(&raw("- just\n- a list")),
            vec!["Workflow definition must be a mapping"]
        );
    }

    #[test]
    fn test_conversion_error_reported() {
        let doc = raw(
            "name: x\nsteps:\n  - id: a\n    agent: x\n    action: go\n    on_error: explode\n",
        );
        let errors = validate(&doc);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("explode"), "{}", errors[0]);
    }

    #[test]
    fn test_policy_errors() {
        let doc = raw(r#"
name: x
steps:
  - id: a
    agent: x
    action: go
    on_error: retry
    retry: {max_attempts: 0, delay_seconds: -1}
"#);
        assert_eq!(
            validate(&doc),
            vec![
                "steps[0]: retry.max_attempts must be at least 1",
                "steps[0]: retry.delay_seconds must not be negative",
            ]
        );
    }

    #[test]
    fn test_policy_durations_are_bounded() {
        let doc = raw(r#"
name: x
steps:
  - id: huge
    agent: x
    action: go
    on_error: retry
    retry: {max_attempts: 2, delay_seconds: 1.0e20}
    timeout_seconds: 1.0e20
  - id: zero
    agent: x
    action: go
    timeout_seconds: 0
"#);
        let limit = MAX_POLICY_SECONDS;
        assert_eq!(
            validate(&doc),
            vec![
                format!("steps[0]: retry.delay_seconds must not exceed {} seconds", limit),
                format!("steps[0]: timeout_seconds must not exceed {} seconds", limit),
                "steps[1]: timeout_seconds must be a positive number".to_string(),
            ]
        );
    }

    #[test]
    fn test_non_finite_policy_rejected() {
        let mut definition = WorkflowDefinition::from_yaml(
            "name: x\nsteps:\n  - id: a\n    agent: x\n    action: go\n",
        )
        .unwrap();
        definition.steps[0].retry.delay_seconds = f64::INFINITY;
        definition.steps[0].timeout_seconds = Some(f64::NAN);
        assert_eq!(
            validate_definition(&definition),
            vec![
                "steps[0]: retry.delay_seconds must be a finite number",
                "steps[0]: timeout_seconds must be a positive number",
            ]
        );
    }

    #[test]
    fn test_validate_definition_matches_raw_rules() {
        let yaml = concat!(
            "name: ' '\nsteps:\n",
            "  - id: a\n    agent: ''\n    action: go\n",
            "  - id: a\n    agent: x\n    action: go\n",
        );
        let definition = WorkflowDefinition::from_yaml(yaml).unwrap();
        assert_eq!(validate(&raw(yaml)), validate_definition(&definition));
        assert_eq!(validate_definition(&definition).len(), 3);
    }

    #[test]
    fn test_lint_references() {
        let definition = WorkflowDefinition::from_yaml(r#"
name: lint
inputs:
  - name: topic
steps:
  - id: first
    agent: x
    action: "{{workflow.inputs.topic}} {{workflow.inputs.tpoic}} {{steps.second.output}}"
    outputs: [links]
  - id: second
    agent: x
    action: "{{steps.first.outputs.links}} {{steps.first.outputs.nope}}"
    inputs:
      nested: ["{{steps.ghost.success}}", "{{vars.x}}"]
    condition: "{{steps.first.success}}"
"#)
        .unwrap();

        let warnings = lint_references(&definition);
        assert_eq!(warnings.len(), 5, "{:#?}", warnings);
        assert!(warnings[0].contains("undeclared input 'tpoic'"));
        assert!(warnings[1].contains("step 'second' which has not run yet"));
        assert!(warnings[2].contains("output 'nope' not declared"));
        assert!(warnings.iter().any(|w| w.contains("unknown step 'ghost'")));
        assert!(warnings.iter().any(|w| w.contains("unrecognized reference '{{vars.x}}'")));
    }
}
