//! Reflex CLI — list, validate and run declarative agent workflows.
//!
//! Thin host around reflex-core: every subcommand maps onto one engine
//! operation (list definitions, load, validate, execute).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use reflex_cli::commands::{self, workflow::RunOptions, GlobalOptions};

/// Reflex — declarative workflow engine
#[derive(Parser)]
#[command(name = "reflex", version, about = "Reflex — declarative agent workflow engine")]
pub struct Cli {
    /// Engine config file (defaults to ./reflex.yaml when present)
    #[arg(long, env = "REFLEX_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Directory to search for workflows; repeat to search several.
    /// Replaces the configured `workflow_dirs`.
    #[arg(long = "workflows-dir", env = "REFLEX_WORKFLOWS_DIR", global = true)]
    workflows_dir: Vec<PathBuf>,

    /// Fail steps whose `{{...}}` references resolve to nothing
    #[arg(long, global = true)]
    strict: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List, inspect, validate and run workflows
    Workflow {
        #[command(subcommand)]
        action: WorkflowAction,
    },
}

#[derive(Subcommand)]
enum WorkflowAction {
    /// List workflows in the search directories
    List,
    /// Print a workflow definition as YAML
    Show {
        /// Workflow name or path to a definition file
        target: String,
    },
    /// Validate a workflow without executing it
    Validate {
        /// Workflow name or path to a definition file
        target: String,
    },
    /// Run a workflow
    Run {
        /// Workflow name or path to a definition file
        target: String,
        /// Workflow input as key=value (repeatable)
        #[arg(long = "input", short = 'i')]
        inputs: Vec<String>,
        /// Workflow inputs as a JSON object
        #[arg(long)]
        inputs_json: Option<String>,
        /// Use an echo agent instead of the configured agents
        #[arg(long)]
        dry_run: bool,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
        /// Prompt for missing required inputs
        #[arg(long)]
        interactive: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reflex_core=warn,reflex_cli=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let options = GlobalOptions {
        config: cli.config,
        workflow_dirs: cli.workflows_dir,
        strict: cli.strict,
    };

    let result = match cli.command {
        Some(Commands::Workflow { action }) => run_workflow(&options, action).await,
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help().ok();
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run_workflow(options: &GlobalOptions, action: WorkflowAction) -> Result<(), String> {
    let config = commands::load_config(options)?;
    match action {
        WorkflowAction::List => commands::workflow::list(&config),
        WorkflowAction::Show { target } => commands::workflow::show(&config, &target),
        WorkflowAction::Validate { target } => commands::workflow::validate(&config, &target),
        WorkflowAction::Run {
            target,
            inputs,
            inputs_json,
            dry_run,
            json,
            interactive,
        } => {
            let run_options = RunOptions {
                inputs,
                inputs_json,
                dry_run,
                json,
                interactive,
            };
            let result = commands::workflow::run(&config, &target, &run_options).await?;
            if result.is_success() {
                Ok(())
            } else {
                Err(format!(
                    "Workflow '{}' failed: {}",
                    result.workflow_name,
                    result.error.as_deref().unwrap_or("unknown error")
                ))
            }
        }
    }
}
