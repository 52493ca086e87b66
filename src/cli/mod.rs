mod config;

pub use config::CaseflowConfig;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::info;

use crate::engine::loader;
use crate::engine::types::{Context, InstanceStatus};
use crate::engine::{EngineOptions, WorkflowEngine};
use crate::expr;
use crate::steps::HandlerRegistry;
use crate::storage::memory::MemoryInstanceStore;

#[derive(Parser)]
#[command(name = "caseflow", version, about = "Case-file workflow engine")]
pub struct Cli {
    /// Path to a .env file to load (default: auto-detect .env in cwd)
    #[arg(long, global = true)]
    dotenv: Option<PathBuf>,

    /// Path to a caseflow.yaml config file (default: auto-detect in cwd)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Execution-loop overrides shared by `run` and `serve`.
#[derive(Args, Debug, Default)]
pub struct EngineArgs {
    /// Stop the workflow when a step reports a failed result
    /// (`--halt-on-step-failure`, or `=false` to override the config file)
    #[arg(
        long,
        env = "CASEFLOW_HALT_ON_STEP_FAILURE",
        num_args = 0..=1,
        default_missing_value = "true",
        action = ArgAction::Set
    )]
    halt_on_step_failure: Option<bool>,

    /// Default per-step deadline in seconds
    #[arg(long, env = "CASEFLOW_STEP_TIMEOUT")]
    step_timeout: Option<f64>,

    /// Deadline for a whole workflow instance in seconds
    #[arg(long, env = "CASEFLOW_INSTANCE_TIMEOUT")]
    instance_timeout: Option<f64>,

    /// Maximum step invocations per instance
    #[arg(long, env = "CASEFLOW_MAX_STEPS")]
    max_steps: Option<usize>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one workflow instance from a definition file
    Run {
        /// Path to the .yaml/.json definition file
        definition: PathBuf,

        /// Workflow instance id (default: random UUID)
        #[arg(short, long)]
        workflow_id: Option<String>,

        /// Initial context as JSON string
        #[arg(short, long)]
        context: Option<String>,

        /// Enable verbose output
        #[arg(short, long)]
        verbose: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Validate a definition file without executing it
    Validate {
        /// Path to the .yaml/.json definition file
        definition: PathBuf,
    },

    /// List registered step handlers
    Handlers,

    /// Start the REST API server
    Serve {
        /// Host to bind to
        #[arg(long, env = "HOST")]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,

        /// Directory of definition files to register at startup
        #[arg(long, env = "DEFINITIONS_DIR")]
        definitions_dir: Option<PathBuf>,

        /// Maximum request body size in bytes (default: 1048576 = 1 MB)
        #[arg(long, env = "MAX_BODY")]
        max_body: Option<usize>,

        #[command(flatten)]
        engine: EngineArgs,
    },
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    // Load .env file
    load_dotenv(cli.dotenv.as_deref());

    let config = CaseflowConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            definition,
            workflow_id,
            context,
            verbose,
            engine,
        } => {
            let options = resolve_options(&engine, &config)?;
            cmd_run(definition, workflow_id, context, verbose, options).await
        }
        Commands::Validate { definition } => cmd_validate(definition),
        Commands::Handlers => cmd_handlers(),
        Commands::Serve {
            host,
            port,
            definitions_dir,
            max_body,
            engine,
        } => {
            let options = resolve_options(&engine, &config)?;
            let host = host
                .or(config.host.clone())
                .unwrap_or_else(|| "0.0.0.0".to_string());
            let port = port.or(config.port).unwrap_or(3000);
            let definitions_dir =
                definitions_dir.or(config.definitions_dir.as_ref().map(PathBuf::from));
            let max_body = max_body.or(config.max_body).unwrap_or(1_048_576);

            let engine = Arc::new(build_engine(options));
            if let Some(dir) = definitions_dir {
                preload_definitions(&engine, &dir)?;
            }
            crate::api::serve(&host, port, engine, max_body).await
        }
    }
}

/// Load environment variables from a .env file.
/// If an explicit path is given, load from that path (error if missing).
/// Otherwise, auto-detect .env in the current working directory (silently skip if absent).
fn load_dotenv(explicit_path: Option<&Path>) {
    match explicit_path {
        Some(path) => match dotenvy::from_path(path) {
            Ok(()) => info!("Loaded env from {}", path.display()),
            Err(e) => {
                eprintln!(
                    "Warning: Failed to load dotenv file '{}': {}",
                    path.display(),
                    e
                );
            }
        },
        None => match dotenvy::dotenv() {
            Ok(path) => info!("Loaded env from {}", path.display()),
            Err(dotenvy::Error::Io(_)) => {}
            Err(e) => {
                eprintln!("Warning: Failed to parse .env file: {}", e);
            }
        },
    }
}

/// Flags and env win over the config file, which wins over engine defaults.
fn resolve_options(args: &EngineArgs, config: &CaseflowConfig) -> Result<EngineOptions> {
    let mut options = config.engine_options()?;
    if let Some(halt) = args.halt_on_step_failure {
        options.halt_on_step_failure = halt;
    }
    if let Some(s) = args.step_timeout {
        options.step_timeout = Some(config::seconds("--step-timeout", s)?);
    }
    if let Some(s) = args.instance_timeout {
        options.instance_timeout = Some(config::seconds("--instance-timeout", s)?);
    }
    if let Some(max) = args.max_steps {
        options.max_steps = max;
    }
    Ok(options)
}

fn build_engine(options: EngineOptions) -> WorkflowEngine {
    WorkflowEngine::new(
        Arc::new(HandlerRegistry::with_builtins()),
        Arc::new(MemoryInstanceStore::new()),
    )
    .with_options(options)
}

fn preload_definitions(engine: &WorkflowEngine, dir: &Path) -> Result<()> {
    for (path, definition) in loader::load_dir(dir)? {
        let id = definition.id.clone();
        engine
            .register_definition(&id, definition)
            .with_context(|| format!("Failed to register {}", path.display()))?;
    }
    info!(
        dir = %dir.display(),
        count = engine.definitions().count(),
        "Loaded workflow definitions"
    );
    Ok(())
}

async fn cmd_run(
    definition_path: PathBuf,
    workflow_id: Option<String>,
    context_json: Option<String>,
    verbose: bool,
    options: EngineOptions,
) -> Result<()> {
    let definition = loader::load_definition(&definition_path)
        .with_context(|| format!("Failed to load definition: {}", definition_path.display()))?;

    println!(
        "Workflow: {} [{}] ({} steps)",
        definition.name,
        definition.id,
        definition.steps.len()
    );

    if verbose {
        println!("\nSteps:");
        for (index, step) in definition.steps.iter().enumerate() {
            println!("  {} {} [{}]", index, step.id, step.step_type);
            if let Some(ref next) = step.next {
                println!("    next: {}", serde_json::to_string(next)?);
            }
            if let Some(t) = step.timeout_s {
                println!("    timeout: {}s", t);
            }
        }
    }

    let initial_ctx: Context = match context_json {
        Some(json) => {
            serde_json::from_str(&json).with_context(|| "Failed to parse --context JSON")?
        }
        None => Context::new(),
    };

    let engine = build_engine(options);
    let definition_id = definition.id.clone();
    engine.register_definition(&definition_id, definition)?;

    let workflow_id = workflow_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let instance = engine
        .start_workflow(&definition_id, &workflow_id, initial_ctx)
        .await?;

    let status = instance.status_view();
    println!("\nWorkflow ID: {}", instance.id);
    println!("Status: {} ({})", status.status, status.progress);

    println!("\nSteps executed:");
    for result in &instance.results {
        let status_icon = match result.status {
            crate::engine::types::StepStatus::Success => "✓",
            crate::engine::types::StepStatus::Failed => "✗",
            crate::engine::types::StepStatus::Waiting => "…",
        };
        println!("  {} {}", status_icon, result.step_id);
        if let Some(ref err) = result.error {
            println!("    Error: {}", err);
        }
        if verbose && !result.output.is_empty() {
            println!("    Output: {}", serde_json::to_string(&result.output)?);
        }
    }

    if !instance.context.is_empty() {
        println!("\nContext:");
        println!("{}", serde_json::to_string_pretty(&instance.context)?);
    }

    if instance.status == InstanceStatus::Failed {
        anyhow::bail!(
            "Workflow '{}' failed: {}",
            instance.id,
            instance.error.as_deref().unwrap_or("unknown error")
        );
    }

    Ok(())
}

fn cmd_validate(definition_path: PathBuf) -> Result<()> {
    let registry = HandlerRegistry::with_builtins();

    let definition = loader::load_definition(&definition_path)
        .with_context(|| format!("Failed to load definition: {}", definition_path.display()))?;

    println!("Workflow: {} [{}]", definition.name, definition.id);
    println!("Steps: {}", definition.steps.len());

    let mut errors = definition.validate();
    let mut warnings = Vec::new();

    for step in &definition.steps {
        if !registry.contains(&step.step_type) {
            errors.push(format!(
                "Step '{}' uses step type '{}' with no registered handler",
                step.id, step.step_type
            ));
        }
        if let Some(crate::engine::types::Transition::Conditional { condition, .. }) = &step.next
            && !condition.trim().is_empty()
            && let Err(e) = expr::parse(condition)
        {
            warnings.push(format!(
                "Step '{}' condition '{}' does not parse ({}); it will always take the else branch",
                step.id, condition, e
            ));
        }
    }

    for warning in &warnings {
        println!("  warning: {}", warning);
    }

    if errors.is_empty() {
        println!("Validation: OK");
        println!("\nSteps:");
        for (index, step) in definition.steps.iter().enumerate() {
            println!("  {} {} [{}]", index, step.id, step.step_type);
        }
        Ok(())
    } else {
        println!("Validation: FAILED");
        for err in &errors {
            println!("  - {}", err);
        }
        anyhow::bail!("{} validation error(s) found", errors.len());
    }
}

fn cmd_handlers() -> Result<()> {
    let registry = HandlerRegistry::with_builtins();
    let handlers = registry.list();

    println!("{:<20} DESCRIPTION", "STEP TYPE");
    println!("{}", "-".repeat(60));

    for (name, desc) in &handlers {
        println!("{:<20} {}", name, desc);
    }

    println!("\nTotal: {} handler(s)", handlers.len());
    Ok(())
}
