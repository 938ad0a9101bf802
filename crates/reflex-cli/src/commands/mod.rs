//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command and drives the
//! reflex-core engine through an [`EngineConfig`].

pub mod workflow;

use std::path::{Path, PathBuf};

use reflex_core::EngineConfig;

/// Global options shared by every command.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub workflow_dirs: Vec<PathBuf>,
    pub strict: bool,
}

/// Load the engine config and apply command-line overrides.
///
/// `--workflows-dir` replaces the configured search path rather than
/// extending it.
pub fn load_config(options: &GlobalOptions) -> Result<EngineConfig, String> {
    let mut config =
        EngineConfig::load(options.config.as_deref()).map_err(|e| e.to_string())?;

    if !options.workflow_dirs.is_empty() {
        config.workflow_dirs = options.workflow_dirs.clone();
    }
    if options.strict {
        config.strict_references = true;
    }
    tracing::debug!(
        "[CLI] Workflow dirs: {:?}, strict references: {}",
        config.workflow_dirs,
        config.strict_references
    );
    Ok(config)
}

/// A `<name|file>` argument: existing paths are files, anything else is a
/// catalog name.
pub fn is_file_target(target: &str) -> bool {
    Path::new(target).is_file()
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", head)
    }
}
