//! Engine configuration, loaded from `reflex.yaml`.
//!
//! ```yaml
//! workflow_dirs: ["workflows", ".reflex/workflows"]
//! strict_references: false
//! env_files: [".env.local", ".env"]
//! agents:
//!   researcher:
//!     url: "https://agents.internal/research"
//!     api_key: "${RESEARCH_TOKEN}"
//!     timeout_secs: 120
//! ```
//!
//! Every field is optional; missing fields take their defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::workflow::agent::{AgentError, AgentRegistry};
use crate::workflow::catalog::WorkflowCatalog;
use crate::workflow::env::EnvSnapshot;
use crate::workflow::http_agent::{AgentEndpoint, HttpAgent};
use crate::workflow::resolver::ReferenceMode;

/// Config file picked up from the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "reflex.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directories searched for workflow definitions, in order
    pub workflow_dirs: Vec<PathBuf>,

    /// Fail steps on references that resolve to nothing
    pub strict_references: bool,

    /// Dotenv files merged into the environment snapshot
    pub env_files: Vec<PathBuf>,

    /// Remote agents by logical name
    pub agents: HashMap<String, AgentEndpoint>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut workflow_dirs = vec![
            PathBuf::from("workflows"),
            PathBuf::from(".reflex/workflows"),
        ];
        if let Some(home) = dirs::home_dir() {
            workflow_dirs.push(home.join(".reflex").join("workflows"));
        }

        Self {
            workflow_dirs,
            strict_references: false,
            env_files: vec![PathBuf::from(".env.local"), PathBuf::from(".env")],
            agents: HashMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, WorkflowError> {
        serde_yaml::from_str(yaml)
            .map_err(|e| WorkflowError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, WorkflowError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            WorkflowError::Config(format!("Failed to read config '{}': {}", path.display(), e))
        })?;
        let config = Self::from_yaml(&content)?;
        tracing::info!("[Config] Loaded '{}'", path.display());
        Ok(config)
    }

    /// Load an explicit config file, else `reflex.yaml` if present, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, WorkflowError> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(DEFAULT_CONFIG_FILE)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn reference_mode(&self) -> ReferenceMode {
        if self.strict_references {
            ReferenceMode::Strict
        } else {
            ReferenceMode::Lenient
        }
    }

    pub fn catalog(&self) -> WorkflowCatalog {
        WorkflowCatalog::new(self.workflow_dirs.iter().cloned())
    }

    /// Process environment plus configured dotenv files.
    pub fn env_snapshot(&self) -> EnvSnapshot {
        EnvSnapshot::capture().with_env_files(&self.env_files)
    }

    /// Registry of configured HTTP agents.
    pub fn agent_registry(&self, env: &EnvSnapshot) -> Result<AgentRegistry, AgentError> {
        let mut registry = AgentRegistry::new();
        for (name, endpoint) in &self.agents {
            registry.register(name.clone(), Arc::new(HttpAgent::new(endpoint, env)?));
        }
        Ok(registry)
    }
}
