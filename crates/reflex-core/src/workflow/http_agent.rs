//! HTTP agent — forwards step invocations to a remote endpoint.
//!
//! POST {url}
//! Headers:
//!   Authorization: Bearer {api_key}   (when configured)
//!   content-type: application/json
//! Body:
//!   {"agent": "...", "action": "...", "inputs": {...}}
//!
//! A 2xx JSON response is the step's output; when it is an object with an
//! `output` field, that field is used instead. A body of `{"error": "..."}`
//! without `output` is reported as a failure. Non-JSON bodies are returned
//! as plain strings.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::workflow::agent::{Agent, AgentError};
use crate::workflow::env::EnvSnapshot;

/// Where and how to reach a remote agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEndpoint {
    pub url: String,

    /// Bearer token; supports `${ENV_VAR}` / `${ENV_VAR:-default}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Client-level request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Extra request headers
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

fn default_timeout_secs() -> u64 {
    300
}

pub struct HttpAgent {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    headers: HashMap<String, String>,
}

impl HttpAgent {
    pub fn new(endpoint: &AgentEndpoint, env: &EnvSnapshot) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(endpoint.timeout_secs))
            .build()
            .map_err(|e| AgentError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        let api_key = endpoint
            .api_key
            .as_ref()
            .map(|k| env.expand(k))
            .filter(|k| !k.is_empty());

        Ok(Self {
            client,
            url: env.expand(&endpoint.url),
            api_key,
            headers: endpoint
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), env.expand(v)))
                .collect(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn request_body(agent: &str, action: &str, inputs: &Map<String, Value>) -> Value {
        json!({
            "agent": agent,
            "action": action,
            "inputs": inputs,
        })
    }
}

/// Interpret a successful response body.
fn parse_response(body: &str) -> Result<Value, AgentError> {
    let json: Value = match serde_json::from_str(body) {
        Ok(json) => json,
        Err(_) => return Ok(Value::String(body.to_string())),
    };

    if let Value::Object(map) = &json {
        if let Some(output) = map.get("output") {
            return Ok(output.clone());
        }
        if let Some(Value::String(error)) = map.get("error") {
            return Err(AgentError::Failed(error.clone()));
        }
    }
    Ok(json)
}

#[async_trait]
impl Agent for HttpAgent {
    async fn invoke(
        &self,
        agent: &str,
        action: &str,
        inputs: &Map<String, Value>,
    ) -> Result<Value, AgentError> {
        tracing::info!("[HttpAgent] Calling {} for agent '{}'", self.url, agent);

        let mut request = self
            .client
            .post(&self.url)
            .header("content-type", "application/json")
            .json(&Self::request_body(agent, action, inputs));

        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AgentError::Transport(format!("Request to {} timed out: {}", self.url, e))
            } else {
                AgentError::Transport(format!("HTTP request failed: {}", e))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AgentError::Transport(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(AgentError::Failed(format!("API returned {}: {}", status, body)));
        }

        parse_response(&body)
    }
}
