//! Step runner — executes one step against the agent collaborator.
//!
//! 1. Resolve `condition`; a falsy condition skips the step without
//!    invoking the agent.
//! 2. Resolve `action` and `inputs`.
//! 3. Invoke the agent up to `max_attempts` times (more than once only
//!    under `on_error: retry`), sleeping `retry.delay_seconds` in between.
//! 4. On success, pick the declared outputs out of the agent's result map.
//! 5. Once attempts are exhausted apply `on_error`: `skip` records a
//!    `skipped` result carrying the error, anything else records `failed`.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};

use crate::workflow::agent::{Agent, AgentError};
use crate::workflow::resolver::{is_truthy, render, Resolver};
use crate::workflow::result::StepResult;
use crate::workflow::schema::{OnError, StepSpec};

pub struct StepRunner {
    agent: Arc<dyn Agent>,
}

impl StepRunner {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self { agent }
    }

    pub async fn run_step(&self, step: &StepSpec, resolver: &Resolver) -> StepResult {
        let started = Instant::now();

        if let Some(condition) = &step.condition {
            match resolver.try_resolve(condition) {
                Ok(value) if !is_truthy(&value) => {
                    tracing::info!("[StepRunner] Step '{}' skipped: condition not met", step.id);
                    return StepResult::skipped(&step.id, None);
                }
                Ok(_) => {}
                Err(e) => return give_up(step, e.to_string(), started, 0),
            }
        }

        let (action, inputs) = match materialize(step, resolver) {
            Ok(resolved) => resolved,
            Err(e) => return give_up(step, e, started, 0),
        };

        let max_attempts = step.max_attempts();
        let mut attempts = 0;
        let mut last_error = String::new();

        while attempts < max_attempts {
            attempts += 1;
            tracing::debug!(
                "[StepRunner] Invoking agent '{}' for step '{}' (attempt {}/{})",
                step.agent,
                step.id,
                attempts,
                max_attempts
            );

            match self.invoke(step, &action, &inputs).await {
                Ok(output) => {
                    let outputs = extract_outputs(step, &output);
                    return StepResult::success(&step.id, output, outputs)
                        .with_timing(elapsed_ms(started), attempts);
                }
                Err(e) => {
                    last_error = e.to_string();
                    if attempts < max_attempts {
                        tracing::warn!(
                            "[StepRunner] Step '{}' attempt {} failed: {}, retrying",
                            step.id,
                            attempts,
                            last_error
                        );
                        let delay = step.retry.delay();
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
        }

        give_up(step, last_error, started, attempts)
    }

    async fn invoke(
        &self,
        step: &StepSpec,
        action: &str,
        inputs: &Map<String, Value>,
    ) -> Result<Value, AgentError> {
        let call = self.agent.invoke(&step.agent, action, inputs);
        match step.timeout() {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Err(AgentError::Timeout(limit)),
            },
            None => call.await,
        }
    }
}

/// Resolve the step's action text and input map.
fn materialize(
    step: &StepSpec,
    resolver: &Resolver,
) -> Result<(String, Map<String, Value>), String> {
    let action = resolver
        .try_resolve(&Value::String(step.action.clone()))
        .map_err(|e| e.to_string())?;

    let inputs = match resolver
        .try_resolve(&Value::Object(step.inputs.clone()))
        .map_err(|e| e.to_string())?
    {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    Ok((render(&action), inputs))
}

/// Declared outputs present in the agent's result map.
fn extract_outputs(step: &StepSpec, output: &Value) -> Map<String, Value> {
    let mut outputs = Map::new();
    if let Value::Object(map) = output {
        for decl in &step.outputs {
            if let Some(value) = map.get(&decl.name) {
                outputs.insert(decl.name.clone(), value.clone());
            }
        }
    }
    outputs
}

fn give_up(step: &StepSpec, error: String, started: Instant, attempts: u32) -> StepResult {
    let result = match step.on_error {
        OnError::Skip => {
            tracing::warn!("[StepRunner] Step '{}' failed, skipping: {}", step.id, error);
            StepResult::skipped(&step.id, Some(error))
        }
        OnError::Fail | OnError::Retry => {
            tracing::warn!("[StepRunner] Step '{}' failed: {}", step.id, error);
            StepResult::failed(&step.id, error)
        }
    };
    result.with_timing(elapsed_ms(started), attempts)
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use serde_json::json;

    use crate::workflow::agent::FnAgent;
    use crate::workflow::env::EnvSnapshot;
    use crate::workflow::resolver::ReferenceMode;
    use crate::workflow::schema::{OutputSpec, RetryPolicy};

    fn step(yaml: &str) -> StepSpec {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn resolver() -> Resolver {
        let mut inputs = Map::new();
        inputs.insert("topic".into(), json!("frogs"));
        inputs.insert("enabled".into(), json!(false));
        Resolver::new(inputs, Arc::new(EnvSnapshot::default()))
    }

    /// Agent that fails the first `failures` calls, then echoes the action.
    fn flaky(failures: u32, calls: Arc<AtomicU32>) -> Arc<dyn Agent> {
        Arc::new(FnAgent::new(move |_, action, _| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < failures {
                Err(AgentError::Failed(format!("transient error {}", n + 1)))
            } else {
                Ok(json!({"text": action, "extra": 1}))
            }
        }))
    }

    #[tokio::test]
    async fn test_success_extracts_declared_outputs() {
        let calls = Arc::new(AtomicU32::new(0));
        let runner = StepRunner::new(flaky(0, calls.clone()));
        let spec = step(
            "id: a\nagent: x\naction: 'say {{workflow.inputs.topic}}'\noutputs: [text, missing]",
        );

        let result = runner.run_step(&spec, &resolver()).await;
        assert!(result.is_success());
        assert_eq!(result.output, json!({"text": "say frogs", "extra": 1}));
        assert_eq!(result.outputs.len(), 1);
        assert_eq!(result.outputs["text"], json!("say frogs"));
        assert_eq!(result.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_falsy_condition_skips_without_invoking() {
        let calls = Arc::new(AtomicU32::new(0));
        let runner = StepRunner::new(flaky(0, calls.clone()));
        let spec = step("id: a\nagent: x\naction: go\ncondition: '{{workflow.inputs.enabled}}'");

        let result = runner.run_step(&spec, &resolver()).await;
        assert_eq!(result.status, crate::workflow::result::StepStatus::Skipped);
        assert_eq!(result.duration_ms, 0);
        assert_eq!(result.attempts, 0);
        assert!(result.error.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_truthy_condition_runs() {
        let calls = Arc::new(AtomicU32::new(0));
        let runner = StepRunner::new(flaky(0, calls.clone()));
        let spec = step(
            "id: a\nagent: x\naction: go\ncondition: 'topic is {{workflow.inputs.topic}}'",
        );

        assert!(runner.run_step(&spec, &resolver()).await.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let runner = StepRunner::new(flaky(2, calls.clone()));
        let mut spec = step("id: a\nagent: x\naction: go\non_error: retry");
        spec.retry = RetryPolicy {
            max_attempts: 3,
            delay_seconds: 0.0,
        };

        let result = runner.run_step(&spec, &resolver()).await;
        assert!(result.is_success());
        assert_eq!(result.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausted_fails_with_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let runner = StepRunner::new(flaky(10, calls.clone()));
        let spec = step(
            "id: a\nagent: x\naction: go\non_error: retry\nretry: {max_attempts: 2, delay_seconds: 0}",
        );

        let result = runner.run_step(&spec, &resolver()).await;
        assert_eq!(result.status, crate::workflow::result::StepStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("Agent failed: transient error 2"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fail_policy_invokes_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let runner = StepRunner::new(flaky(10, calls.clone()));
        let spec = step("id: a\nagent: x\naction: go\nretry: {max_attempts: 5, delay_seconds: 0}");

        let result = runner.run_step(&spec, &resolver()).await;
        assert_eq!(result.status, crate::workflow::result::StepStatus::Failed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_skip_policy_records_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let runner = StepRunner::new(flaky(10, calls.clone()));
        let spec = step("id: a\nagent: x\naction: go\non_error: skip");

        let result = runner.run_step(&spec, &resolver()).await;
        assert_eq!(result.status, crate::workflow::result::StepStatus::Skipped);
        assert_eq!(result.error.as_deref(), Some("Agent failed: transient error 1"));
        assert_eq!(result.output, Value::Null);
        assert_eq!(result.attempts, 1);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        struct Slow;

        #[async_trait::async_trait]
        impl Agent for Slow {
            async fn invoke(
                &self,
                _: &str,
                _: &str,
                _: &Map<String, Value>,
            ) -> Result<Value, AgentError> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(Value::Null)
            }
        }

        let runner = StepRunner::new(Arc::new(Slow));
        let spec = step("id: a\nagent: x\naction: go\ntimeout_seconds: 0.05");
        let result = runner.run_step(&spec, &resolver()).await;
        assert_eq!(result.status, crate::workflow::result::StepStatus::Failed);
        assert!(result.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_oversized_timeout_runs_normally() {
        let calls = Arc::new(AtomicU32::new(0));
        let runner = StepRunner::new(flaky(0, calls.clone()));
        let spec = step("id: a\nagent: x\naction: go\ntimeout_seconds: 1.0e20");
        let result = runner.run_step(&spec, &resolver()).await;
        assert_eq!(result.status, crate::workflow::result::StepStatus::Success);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resolved_inputs_reach_agent() {
        let seen = Arc::new(std::sync::Mutex::new(Map::new()));
        let sink = seen.clone();
        let runner = StepRunner::new(Arc::new(FnAgent::new(move |_, _, inputs| {
            *sink.lock().unwrap() = inputs.clone();
            Ok(Value::Null)
        })));
        let spec = step(
            "id: a\nagent: x\naction: go\ninputs:\n  q: '{{workflow.inputs.topic}}'\n  n: 2",
        );

        runner.run_step(&spec, &resolver()).await;
        let seen = seen.lock().unwrap();
        assert_eq!(seen["q"], json!("frogs"));
        assert_eq!(seen["n"], json!(2));
    }

    #[tokio::test]
    async fn test_non_map_output_has_no_named_outputs() {
        let runner = StepRunner::new(Arc::new(FnAgent::new(|_, _, _| Ok(json!("plain")))));
        let mut spec = step("id: a\nagent: x\naction: go");
        spec.outputs = vec![OutputSpec {
            name: "text".into(),
            description: None,
        }];
        let result = runner.run_step(&spec, &resolver()).await;
        assert_eq!(result.output, json!("plain"));
        assert!(result.outputs.is_empty());
    }

    #[tokio::test]
    async fn test_strict_unresolved_reference_fails_step() {
        let calls = Arc::new(AtomicU32::new(0));
        let runner = StepRunner::new(flaky(0, calls.clone()));
        let spec = step("id: a\nagent: x\naction: 'use {{steps.ghost.output}}'\non_error: retry");
        let resolver = resolver().with_mode(ReferenceMode::Strict);

        let result = runner.run_step(&spec, &resolver).await;
        assert_eq!(result.status, crate::workflow::result::StepStatus::Failed);
        assert_eq!(
            result.error.as_deref(),
            Some("Unresolved reference '{{steps.ghost.output}}'")
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
