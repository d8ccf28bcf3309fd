//! Planex CLI - validate and run tool-call plans

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;

use planex::{
    dag, Engine, EventLog, Execution, ExecutionSink, ExecutionStatus, FixSuggestion, JsonlSink,
    Plan, PlanexConfig, PlanexError, StepStatus, ToolFixtures,
};

#[derive(Parser)]
#[command(name = "planex")]
#[command(about = "Plan execution engine for tool-call DAGs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a plan file (schema + structure)
    Validate {
        /// Path to a .json / .yaml plan
        plan: PathBuf,
    },

    /// Run a plan against scripted tools
    Run {
        /// Path to a .json / .yaml plan
        plan: PathBuf,

        /// Tool fixture file (name -> outcomes)
        #[arg(short, long)]
        tools: PathBuf,

        #[arg(long)]
        max_retries: Option<u32>,

        #[arg(long)]
        retry_delay_ms: Option<u64>,

        /// Max steps running at once
        #[arg(short, long)]
        parallel: Option<usize>,

        /// Compensate completed mutating steps on failure
        #[arg(long)]
        rollback: bool,

        /// Keep dispatching independent steps after a failure
        #[arg(long)]
        continue_on_error: bool,

        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Append every execution snapshot to this NDJSON file
        #[arg(long)]
        snapshots: Option<PathBuf>,

        /// Print the event log after the run
        #[arg(long)]
        events: bool,
    },

    /// Show the effective configuration
    Config,
}

struct RunArgs {
    plan: PathBuf,
    tools: PathBuf,
    max_retries: Option<u32>,
    retry_delay_ms: Option<u64>,
    parallel: Option<usize>,
    rollback: bool,
    continue_on_error: bool,
    timeout_ms: Option<u64>,
    snapshots: Option<PathBuf>,
    events: bool,
}

#[tokio::main]
async fn main() {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    // Logs go to stderr, stdout carries the report
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { plan } => validate_plan(&plan),
        Commands::Run {
            plan,
            tools,
            max_retries,
            retry_delay_ms,
            parallel,
            rollback,
            continue_on_error,
            timeout_ms,
            snapshots,
            events,
        } => {
            run_plan(RunArgs {
                plan,
                tools,
                max_retries,
                retry_delay_ms,
                parallel,
                rollback,
                continue_on_error,
                timeout_ms,
                snapshots,
                events,
            })
            .await
        }
        Commands::Config => show_config(),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            if let Some(suggestion) = e
                .downcast_ref::<PlanexError>()
                .and_then(FixSuggestion::fix_suggestion)
            {
                eprintln!("  {} {}", "Fix:".yellow(), suggestion);
            }
            std::process::exit(1);
        }
    }
}

fn load_plan(path: &Path) -> anyhow::Result<Plan> {
    Plan::from_path(path).with_context(|| format!("loading plan {}", path.display()))
}

fn validate_plan(path: &Path) -> anyhow::Result<bool> {
    let plan = load_plan(path)?;
    let report = dag::check_plan(&plan);

    for warning in &report.warnings {
        println!("  {} {}", "⚠".yellow(), warning);
    }

    if plan.is_empty() {
        return Err(PlanexError::EmptyPlan.into());
    }
    if !report.is_valid() {
        for issue in &report.errors {
            println!("  {} {}", "✗".red(), issue);
        }
        return Err(PlanexError::InvalidPlan {
            issues: report.errors,
        }
        .into());
    }

    println!("{} Plan '{}' is valid", "✓".green(), path.display());
    if let Some(plan_id) = &plan.metadata.plan_id {
        println!("  Plan id: {}", plan_id);
    }
    println!("  Steps: {}", plan.len());
    println!(
        "  Parallel: {}",
        plan.steps.iter().filter(|s| s.parallel).count()
    );
    Ok(true)
}

async fn run_plan(args: RunArgs) -> anyhow::Result<bool> {
    let settings = PlanexConfig::load()?.with_env()?;
    let mut config = settings.execution_config();
    if let Some(n) = args.max_retries {
        config.max_retries = n;
    }
    if let Some(ms) = args.retry_delay_ms {
        config.retry_delay_ms = ms;
    }
    if let Some(n) = args.parallel {
        config.parallel_execution_limit = n;
    }
    if args.rollback {
        config.enable_rollback = true;
    }
    if args.continue_on_error {
        config.continue_on_error = true;
    }
    if args.timeout_ms.is_some() {
        config.timeout_ms = args.timeout_ms;
    }

    let plan = load_plan(&args.plan)?;
    let registry = ToolFixtures::from_path(&args.tools)
        .with_context(|| format!("loading tool fixtures {}", args.tools.display()))?
        .into_registry();

    println!(
        "{} Running {} step(s) | parallel: {} | retries: {}",
        "→".cyan(),
        plan.len(),
        config.parallel_execution_limit.to_string().cyan(),
        config.max_retries.to_string().cyan()
    );

    let event_log = EventLog::new();
    let mut engine = Engine::new(Arc::new(registry)).with_event_log(event_log.clone());
    let snapshots = match args.snapshots.or(settings.persistence.snapshot_path) {
        Some(path) => Some(Arc::new(JsonlSink::open(&path)?)),
        None => None,
    };
    if let Some(sink) = &snapshots {
        engine = engine.with_sink(Arc::clone(sink) as Arc<dyn ExecutionSink>);
    }

    let execution = engine.execute(plan, config).await?;
    if let Some(sink) = &snapshots {
        sink.flush()?;
    }
    print_summary(&execution);

    if args.events {
        println!("{}", "Events:".cyan().bold());
        println!("{}", serde_json::to_string_pretty(&event_log.to_json())?);
    }

    println!("{}", "Snapshot:".cyan().bold());
    println!("{}", serde_json::to_string_pretty(&execution)?);

    Ok(execution.status == ExecutionStatus::Completed)
}

fn print_summary(execution: &Execution) {
    for result in &execution.results {
        let marker = match result.status {
            StepStatus::Completed => "✓".green(),
            StepStatus::Failed => "✗".red(),
            StepStatus::Skipped => "-".yellow(),
            StepStatus::Pending | StepStatus::Running => "?".normal(),
        };
        let mut line = format!(
            "  {} step_{} {} {}",
            marker, result.step_index, result.tool, result.status
        );
        if result.retry_count > 0 {
            line.push_str(&format!(" (retries: {})", result.retry_count));
        }
        if let Some(error) = &result.error {
            line.push_str(&format!(" - {}", error));
        }
        println!("{}", line);
    }

    for comp in &execution.compensations {
        let marker = if comp.success { "↺".cyan() } else { "✗".red() };
        println!(
            "  {} compensate step_{} via {}",
            marker,
            comp.step_index,
            comp.compensating_tool.as_deref().unwrap_or("(none)")
        );
    }

    match &execution.error {
        None if execution.status == ExecutionStatus::Completed => println!(
            "{} Execution {} {} ({} step(s))",
            "✓".green(),
            execution.execution_id,
            execution.status,
            execution.completed_steps
        ),
        error => println!(
            "{} Execution {} {}: {}",
            "✗".red(),
            execution.execution_id,
            execution.status,
            error
                .clone()
                .unwrap_or_else(|| format!("{} step(s) failed", execution.failed_steps))
        ),
    }
}

fn show_config() -> anyhow::Result<bool> {
    let settings = PlanexConfig::load()?.with_env()?;
    println!(
        "{} {}",
        "Config file:".cyan(),
        PlanexConfig::config_path().display()
    );
    print!("{}", settings.to_toml()?);
    println!("{}", "Effective execution config:".cyan());
    println!(
        "{}",
        serde_json::to_string_pretty(&settings.execution_config())?
    );
    Ok(true)
}
