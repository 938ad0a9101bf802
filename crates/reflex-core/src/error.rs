//! Core error type for the Reflex engine.
//!
//! `WorkflowError` covers everything that can go wrong *around* a run:
//! locating, reading and parsing definitions and configuration. Failures
//! that happen *during* a run (validation, missing inputs, agent errors)
//! are captured as data on `WorkflowResult` instead.

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Workflow not found: {0}")]
    NotFound(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Invalid workflow: {0}")]
    Invalid(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl WorkflowError {
    /// Build an `Invalid` error from accumulated validator messages.
    pub fn invalid(errors: &[String]) -> Self {
        WorkflowError::Invalid(errors.join("; "))
    }
}

impl From<std::io::Error> for WorkflowError {
    fn from(e: std::io::Error) -> Self {
        WorkflowError::Io(e.to_string())
    }
}

impl From<serde_yaml::Error> for WorkflowError {
    fn from(e: serde_yaml::Error) -> Self {
        WorkflowError::Parse(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_joins_messages() {
        let err = WorkflowError::invalid(&["a".to_string(), "b".to_string()]);
        assert_eq!(err.to_string(), "Invalid workflow: a; b");
    }
}
