//! Workflow catalog — discovers definition files in a list of directories.
//!
//! Supports `.yaml`, `.yml` and `.json` files. Directories are searched in
//! order and files are re-read on every call, so edits are picked up without
//! restarting the host.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::error::WorkflowError;
use crate::workflow::schema::{parse_document, InputType, WorkflowDefinition};

const WORKFLOW_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Listing entry for a discovered workflow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DefinitionSummary {
    pub name: String,
    pub description: String,
    pub version: String,
    pub path: PathBuf,
    pub inputs: Vec<InputSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub input_type: InputType,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl DefinitionSummary {
    fn from_definition(definition: &WorkflowDefinition, path: &Path) -> Self {
        let name = if definition.name.trim().is_empty() {
            file_stem(path)
        } else {
            definition.name.clone()
        };
        Self {
            name,
            description: definition.description.clone(),
            version: definition.version.clone(),
            path: path.to_path_buf(),
            inputs: definition
                .inputs
                .iter()
                .map(|i| InputSummary {
                    name: i.name.clone(),
                    input_type: i.input_type,
                    required: i.required,
                    default: i.default.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorkflowCatalog {
    dirs: Vec<PathBuf>,
}

impl WorkflowCatalog {
    pub fn new<P: Into<PathBuf>>(dirs: impl IntoIterator<Item = P>) -> Self {
        Self {
            dirs: dirs.into_iter().map(Into::into).collect(),
        }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Candidate files, directory order first, then file name order.
    fn workflow_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for dir in &self.dirs {
            if !dir.is_dir() {
                continue;
            }
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!("[Catalog] Failed to read '{}': {}", dir.display(), e);
                    continue;
                }
            };
            let mut in_dir: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.is_file() && has_workflow_extension(path))
                .collect();
            in_dir.sort();
            files.extend(in_dir);
        }
        files
    }

    /// Summaries of every loadable definition, sorted by name.
    ///
    /// When two files declare the same name the first one found wins.
    /// Files that fail to parse are skipped with a warning.
    pub fn list_definitions(&self) -> Vec<DefinitionSummary> {
        let mut seen = HashSet::new();
        let mut summaries = Vec::new();

        for path in self.workflow_files() {
            let definition = match load_file(&path).and_then(WorkflowDefinition::from_value) {
                Ok(definition) => definition,
                Err(e) => {
                    tracing::warn!("[Catalog] Skipping '{}': {}", path.display(), e);
                    continue;
                }
            };
            let summary = DefinitionSummary::from_definition(&definition, &path);
            if seen.insert(summary.name.clone()) {
                summaries.push(summary);
            } else {
                tracing::warn!(
                    "[Catalog] Duplicate workflow name '{}' in '{}' ignored",
                    summary.name,
                    path.display()
                );
            }
        }

        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Raw document for a workflow, matched by its `name` field first and
    /// then by file stem.
    pub fn load_document(&self, name: &str) -> Result<(PathBuf, Value), WorkflowError> {
        let mut stem_match = None;

        for path in self.workflow_files() {
            match load_file(&path) {
                Ok(document) => {
                    if document.get("name").and_then(Value::as_str) == Some(name) {
                        tracing::debug!("[Catalog] Resolved '{}' to '{}'", name, path.display());
                        return Ok((path, document));
                    }
                }
                Err(e) => tracing::debug!("[Catalog] Unreadable '{}': {}", path.display(), e),
            }
            if stem_match.is_none() && file_stem(&path) == name {
                stem_match = Some(path);
            }
        }

        match stem_match {
            Some(path) => {
                let document = load_file(&path)?;
                Ok((path, document))
            }
            None => Err(WorkflowError::NotFound(format!(
                "'{}' (searched: {})",
                name,
                self.dirs
                    .iter()
                    .map(|d| d.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    pub fn load_definition(&self, name: &str) -> Result<WorkflowDefinition, WorkflowError> {
        let (_, document) = self.load_document(name)?;
        WorkflowDefinition::from_value(document)
    }
}

/// Read and parse one workflow file into a raw document.
pub fn load_file(path: &Path) -> Result<Value, WorkflowError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        WorkflowError::Io(format!("Failed to read workflow file '{}': {}", path.display(), e))
    })?;
    parse_document(&content).map_err(|e| {
        WorkflowError::Parse(format!("Failed to parse '{}': {}", path.display(), e))
    })
}

fn has_workflow_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| WORKFLOW_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}
