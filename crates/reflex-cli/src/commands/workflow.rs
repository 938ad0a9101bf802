//! `reflex workflow` — list, inspect, validate and run workflows.

use std::path::Path;
use std::sync::Arc;

use console::style;
use serde_json::{Map, Value};

use reflex_core::workflow::catalog::load_file;
use reflex_core::workflow::{
    lint_references, validate as validate_document, Agent, EchoAgent, EnvSnapshot, InputType,
    StepResult, StepStatus, WorkflowDefinition, WorkflowExecutor, WorkflowResult,
};
use reflex_core::EngineConfig;

use super::{is_file_target, print_json, truncate};

/// Options for `reflex workflow run`.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// `key=value` pairs
    pub inputs: Vec<String>,
    /// JSON object merged before `inputs`
    pub inputs_json: Option<String>,
    pub dry_run: bool,
    pub json: bool,
    pub interactive: bool,
}

/// Raw document for a `<name|file>` argument, plus a label for messages.
pub fn load_target(config: &EngineConfig, target: &str) -> Result<(String, Value), String> {
    if is_file_target(target) {
        let document = load_file(Path::new(target)).map_err(|e| e.to_string())?;
        Ok((target.to_string(), document))
    } else {
        let (path, document) = config
            .catalog()
            .load_document(target)
            .map_err(|e| e.to_string())?;
        Ok((path.display().to_string(), document))
    }
}

/// Load a target and reject it if the validator finds anything.
fn load_valid(config: &EngineConfig, target: &str) -> Result<WorkflowDefinition, String> {
    let (label, document) = load_target(config, target)?;
    let errors = validate_document(&document);
    if !errors.is_empty() {
        return Err(format!(
            "Workflow '{}' is invalid:\n  - {}",
            label,
            errors.join("\n  - ")
        ));
    }
    WorkflowDefinition::from_value(document).map_err(|e| e.to_string())
}

/// List workflows found in the configured directories.
pub fn list(config: &EngineConfig) -> Result<(), String> {
    let summaries = config.catalog().list_definitions();

    if summaries.is_empty() {
        let dirs: Vec<String> = config
            .workflow_dirs
            .iter()
            .map(|d| d.display().to_string())
            .collect();
        println!("No workflows found (searched: {})", dirs.join(", "));
        return Ok(());
    }

    println!(
        "┌──────────────────────┬──────────────────────────┬────────────────────────────────┐"
    );
    println!(
        "│ Name                 │ Inputs                   │ Description                    │"
    );
    println!(
        "├──────────────────────┼──────────────────────────┼────────────────────────────────┤"
    );

    for summary in &summaries {
        let inputs: Vec<String> = summary
            .inputs
            .iter()
            .map(|i| {
                if i.required && i.default.is_none() {
                    format!("{}*", i.name)
                } else {
                    i.name.clone()
                }
            })
            .collect();
        println!(
            "│ {:<20} │ {:<24} │ {:<30} │",
            truncate(&summary.name, 20),
            truncate(&inputs.join(", "), 24),
            truncate(&summary.description, 30)
        );
    }

    println!(
        "└──────────────────────┴──────────────────────────┴────────────────────────────────┘"
    );
    println!("{} workflow(s); * marks required inputs", summaries.len());
    Ok(())
}

/// Print a loaded definition as YAML, defaults filled in.
pub fn show(config: &EngineConfig, target: &str) -> Result<(), String> {
    let (_, document) = load_target(config, target)?;
    let definition = WorkflowDefinition::from_value(document).map_err(|e| e.to_string())?;
    let yaml = definition.to_yaml().map_err(|e| e.to_string())?;
    print!("{}", yaml);
    Ok(())
}

/// Validate a workflow without executing it.
pub fn validate(config: &EngineConfig, target: &str) -> Result<(), String> {
    let (label, document) = load_target(config, target)?;

    let errors = validate_document(&document);
    if !errors.is_empty() {
        for error in &errors {
            println!("{} {}", style("✗").red(), error);
        }
        return Err(format!(
            "Workflow '{}' has {} error(s)",
            label,
            errors.len()
        ));
    }

    let workflow = WorkflowDefinition::from_value(document).map_err(|e| e.to_string())?;
    println!("{} Workflow '{}' is valid", style("✓").green(), workflow.name);
    println!("   Version: {}", workflow.version);
    println!("   Inputs: {}", workflow.inputs.len());
    println!("   Steps: {}", workflow.steps.len());

    for (i, step) in workflow.steps.iter().enumerate() {
        println!(
            "   {}. {} (agent: {}, on_error: {})",
            i + 1,
            step.display_name(),
            step.agent,
            step.on_error
        );
    }

    for warning in lint_references(&workflow) {
        println!("{} {}", style("⚠").yellow(), warning);
    }

    Ok(())
}

/// Build the input map: `--inputs-json` first, then `--input k=v` pairs,
/// coerced to each declared input's type.
pub fn parse_inputs(
    definition: &WorkflowDefinition,
    pairs: &[String],
    inputs_json: Option<&str>,
) -> Result<Map<String, Value>, String> {
    let mut inputs = match inputs_json {
        Some(json) => match serde_json::from_str::<Value>(json) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err("--inputs-json must be a JSON object".to_string()),
            Err(e) => return Err(format!("Invalid --inputs-json: {}", e)),
        },
        None => Map::new(),
    };

    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| format!("Invalid input '{}': expected key=value", pair))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("Invalid input '{}': empty key", pair));
        }
        let input_type = definition
            .input(key)
            .map(|spec| spec.input_type)
            .unwrap_or(InputType::String);
        inputs.insert(key.to_string(), input_type.coerce(raw));
    }

    Ok(inputs)
}

/// Ask for required inputs that were neither given nor defaulted.
fn prompt_missing_inputs(
    definition: &WorkflowDefinition,
    inputs: &mut Map<String, Value>,
) -> Result<(), String> {
    for spec in &definition.inputs {
        if !spec.required || spec.default.is_some() || inputs.contains_key(&spec.name) {
            continue;
        }
        let prompt = match &spec.description {
            Some(description) => format!("{} ({}): {}", spec.name, spec.input_type, description),
            None => format!("{} ({})", spec.name, spec.input_type),
        };
        let raw: String = dialoguer::Input::new()
            .with_prompt(prompt)
            .interact_text()
            .map_err(|e| format!("Failed to read input '{}': {}", spec.name, e))?;
        inputs.insert(spec.name.clone(), spec.input_type.coerce(&raw));
    }
    Ok(())
}

fn build_agent(
    config: &EngineConfig,
    env: &EnvSnapshot,
    dry_run: bool,
) -> Result<Arc<dyn Agent>, String> {
    if dry_run {
        return Ok(Arc::new(EchoAgent));
    }
    let registry = config.agent_registry(env).map_err(|e| e.to_string())?;
    if registry.names().is_empty() {
        return Err(
            "No agents configured. Add an `agents` section to reflex.yaml or use --dry-run"
                .to_string(),
        );
    }
    Ok(Arc::new(registry))
}

/// Run a workflow and report its result.
///
/// A `failed` run is still `Ok`; the caller decides the exit status.
pub async fn run(
    config: &EngineConfig,
    target: &str,
    options: &RunOptions,
) -> Result<WorkflowResult, String> {
    let definition = load_valid(config, target)?;
    let mut inputs = parse_inputs(&definition, &options.inputs, options.inputs_json.as_deref())?;
    if options.interactive {
        prompt_missing_inputs(&definition, &mut inputs)?;
    }

    let env = config.env_snapshot();
    let agent = build_agent(config, &env, options.dry_run)?;
    let executor = WorkflowExecutor::new(config.catalog(), agent)
        .with_env(env)
        .with_reference_mode(config.reference_mode());

    if !options.json {
        print_header(&definition, options.dry_run);
    }

    let result = executor.execute(definition, inputs).await;

    if options.json {
        let value = serde_json::to_value(&result).map_err(|e| e.to_string())?;
        print_json(&value);
    } else {
        print_result(&result);
    }

    Ok(result)
}

fn print_header(definition: &WorkflowDefinition, dry_run: bool) {
    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║  Reflex Workflow Engine                                  ║");
    println!("╠══════════════════════════════════════════════════════════╣");
    println!("║  Workflow : {:<44} ║", truncate(&definition.name, 44));
    println!("║  Version  : {:<44} ║", truncate(&definition.version, 44));
    println!("║  Steps    : {:<44} ║", definition.steps.len());
    if dry_run {
        println!("║  Mode     : {:<44} ║", "dry run (echo agent)");
    }
    println!("╚══════════════════════════════════════════════════════════╝");
    println!();
}

fn print_step(index: usize, total: usize, step: &StepResult) {
    let marker = match step.status {
        StepStatus::Success => style("✓").green(),
        StepStatus::Skipped => style("⏭").yellow(),
        StepStatus::Failed => style("✗").red(),
        StepStatus::Pending | StepStatus::Running => style("…").dim(),
    };
    println!(
        "── Step {}/{}: {} {} ({} ms, {} attempt(s))",
        index + 1,
        total,
        step.step_id,
        marker,
        step.duration_ms,
        step.attempts
    );
    if let Some(error) = &step.error {
        println!("   {}", style(error).dim());
    }
    if step.status == StepStatus::Success && !step.output.is_null() {
        println!("   Output: {}", truncate(&step.output.to_string(), 200));
    }
}

fn print_result(result: &WorkflowResult) {
    let total = result.step_results.len();
    for (i, step) in result.step_results.iter().enumerate() {
        print_step(i, total, step);
    }

    println!();
    println!("═══════════════════════════════════════════════════════════");
    println!("  Workflow : {}", result.workflow_name);
    println!("  Run      : {}", result.run_id);
    println!("  Status   : {}", result.status);
    println!("  Duration : {} ms", result.duration_ms);
    if let Some(error) = &result.error {
        println!("  Error    : {}", style(error).red());
    }
    let failed = result.failed_steps();
    if !failed.is_empty() {
        println!("  Failed   : {}", failed.join(", "));
    }
    println!("═══════════════════════════════════════════════════════════");

    if !result.outputs.is_empty() {
        println!();
        print_json(&Value::Object(result.outputs.clone()));
    }
}
