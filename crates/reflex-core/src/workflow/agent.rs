//! Agent collaborator interface.
//!
//! An agent is anything that takes `(agent_name, action, inputs)` and returns
//! a result value or an error. The engine only ever sees one `Agent`; hosts
//! route by name with an [`AgentRegistry`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
    #[error("No agent registered for '{0}'")]
    Unknown(String),

    #[error("Agent failed: {0}")]
    Failed(String),

    #[error("Agent timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Agent: Send + Sync {
    async fn invoke(
        &self,
        agent: &str,
        action: &str,
        inputs: &Map<String, Value>,
    ) -> Result<Value, AgentError>;
}

type AgentFn = dyn Fn(&str, &str, &Map<String, Value>) -> Result<Value, AgentError> + Send + Sync;

/// Adapts a synchronous closure into an [`Agent`].
pub struct FnAgent {
    f: Box<AgentFn>,
}

impl FnAgent {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str, &str, &Map<String, Value>) -> Result<Value, AgentError> + Send + Sync + 'static,
    {
        Self { f: Box::new(f) }
    }
}

#[async_trait]
impl Agent for FnAgent {
    async fn invoke(
        &self,
        agent: &str,
        action: &str,
        inputs: &Map<String, Value>,
    ) -> Result<Value, AgentError> {
        (self.f)(agent, action, inputs)
    }
}

/// Returns what it was asked to do. Backs dry runs.
pub struct EchoAgent;

#[async_trait]
impl Agent for EchoAgent {
    async fn invoke(
        &self,
        agent: &str,
        action: &str,
        inputs: &Map<String, Value>,
    ) -> Result<Value, AgentError> {
        Ok(json!({
            "agent": agent,
            "action": action,
            "inputs": inputs,
        }))
    }
}

/// Routes invocations to agents registered by name.
#[derive(Default, Clone)]
pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn Agent>>,
    fallback: Option<Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, agent: Arc<dyn Agent>) -> &mut Self {
        self.agents.insert(name.into(), agent);
        self
    }

    /// Agent used for names with no registration.
    pub fn set_fallback(&mut self, agent: Arc<dyn Agent>) -> &mut Self {
        self.fallback = Some(agent);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Agent>> {
        self.agents.get(name).or(self.fallback.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.agents.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[async_trait]
impl Agent for AgentRegistry {
    async fn invoke(
        &self,
        agent: &str,
        action: &str,
        inputs: &Map<String, Value>,
    ) -> Result<Value, AgentError> {
        match self.get(agent) {
            Some(target) => target.invoke(agent, action, inputs).await,
            None => Err(AgentError::Unknown(agent.to_string())),
        }
    }
}
