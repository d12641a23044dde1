use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use weaver::assets::HttpAssetSearch;
use weaver::audit::AuditLogger;
use weaver::flow::{FlowExecutor, FlowScheduler};
use weaver::generator::CommandGenerator;
use weaver::phase::FlowPlan;
use weaver::registry::MarkerRegistry;
use weaver::template::Template;
use weaver::WeaverConfig;

#[derive(Parser)]
#[command(name = "weaver")]
#[command(version, about = "Parallel fragment-generation orchestrator")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Project directory containing weaver.toml
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a flow plan against a template
    Run {
        /// Path to the plan JSON file
        plan: PathBuf,
        /// Path to the base template
        template: PathBuf,
    },
    /// Show the execution waves a plan would schedule
    Plan {
        plan: PathBuf,
    },
    /// Validate a plan and template without executing
    Validate {
        plan: PathBuf,
        template: PathBuf,
    },
    /// Inspect audit records
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },
}

#[derive(Subcommand)]
pub enum AuditCommands {
    /// List archived runs, most recent first
    List,
    /// Show the most recent run
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let config = WeaverConfig::load_or_default(&project_dir)?;

    match &cli.command {
        Commands::Run { plan, template } => cmd_run(&config, plan, template).await,
        Commands::Plan { plan } => cmd_plan(plan),
        Commands::Validate { plan, template } => cmd_validate(plan, template),
        Commands::Audit { command } => cmd_audit(&config, command),
    }
}

async fn cmd_run(config: &WeaverConfig, plan_file: &Path, template_file: &Path) -> Result<()> {
    let plan = FlowPlan::load(plan_file)?;
    let template_source = std::fs::read_to_string(template_file)
        .with_context(|| format!("Failed to read template: {}", template_file.display()))?;

    config.ensure_directories()?;

    let generator = Arc::new(CommandGenerator::new(
        &config.generator.command,
        config.generator.args.clone(),
    ));
    let search = Arc::new(HttpAssetSearch::new(
        &config.assets.image_endpoint,
        &config.assets.audio_endpoint,
        &config.assets.effective_api_key(),
    ));

    let executor = FlowExecutor::new(
        config.executor_config(plan_file, template_file),
        generator,
        search,
    );

    let report = executor.run(&plan, &template_source).await?;

    println!("Run finished: {:?}", report.status);
    for phase in &report.phases {
        println!(
            "  {} - {:?} ({} fragments, {} remediation rounds)",
            phase.phase_id,
            phase.status,
            phase.applied.len(),
            phase.remediation_rounds
        );
    }
    if let Some(document) = &report.document {
        println!("Document: {}", document.display());
    }
    if let Some(snapshot) = &report.snapshot {
        println!("Last valid snapshot: {}", snapshot.display());
    }
    for issue in &report.unresolved_issues {
        println!("  unresolved: {} - {}", issue.summary(), issue.message);
    }

    if !report.succeeded() {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_plan(plan_file: &Path) -> Result<()> {
    let plan = FlowPlan::load(plan_file)?;
    let scheduler = FlowScheduler::from_phases(&plan.phases)?;
    let waves = scheduler.compute_waves();

    println!(
        "{} phases in {} waves",
        scheduler.phase_count(),
        waves.len()
    );
    for (i, wave) in waves.iter().enumerate() {
        println!("  Wave {}: {:?}", i, wave);
    }
    Ok(())
}

fn cmd_validate(plan_file: &Path, template_file: &Path) -> Result<()> {
    let plan = FlowPlan::load(plan_file)?;
    let template_source = std::fs::read_to_string(template_file)
        .with_context(|| format!("Failed to read template: {}", template_file.display()))?;

    let marker_tokens: Vec<String> = plan.markers.iter().map(|d| d.marker.clone()).collect();
    let template = Template::new(&template_source, &marker_tokens);

    let registry = MarkerRegistry::from_decls(plan.markers.clone())?;
    registry.validate(&template, &plan.phases)?;
    FlowScheduler::from_phases(&plan.phases)?;

    println!(
        "Plan is valid: {} phases, {} markers, {} asset specs",
        plan.phases.len(),
        plan.markers.len(),
        plan.assets.len()
    );
    Ok(())
}

fn cmd_audit(config: &WeaverConfig, command: &AuditCommands) -> Result<()> {
    let logger = AuditLogger::new(&config.output.root.join("audit"));

    match command {
        AuditCommands::List => {
            let runs = logger.list_runs()?;
            if runs.is_empty() {
                println!("No archived runs");
                return Ok(());
            }
            for path in runs {
                let run = logger.load_run(&path)?;
                println!(
                    "{}  {:?}  {} phases",
                    run.started_at.format("%Y-%m-%d %H:%M:%S"),
                    run.final_status,
                    run.phases.len()
                );
            }
        }
        AuditCommands::Show => {
            let runs = logger.list_runs()?;
            let Some(latest) = runs.first() else {
                println!("No archived runs");
                return Ok(());
            };
            let run = logger.load_run(latest)?;
            println!("{}", serde_json::to_string_pretty(&run)?);
        }
    }
    Ok(())
}
