//! CLI command definitions for curator.
//!
//! Runs single manifests against the in-memory collaborators and inspects a
//! persisted registry.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use crate::collaborators::{FixedScorer, MemoryGraphSink, Record, ScriptedExecutor, StaticSource};
use crate::formulary::Measurements;
use crate::manifest::Manifest;
use crate::metrics::{CuratorMetrics, MetricsCollector};
use crate::pipeline::{Collaborators, Curator, PipelineConfig};
use crate::registry::Registry;

/// Policy-gated artifact pipeline.
#[derive(Parser)]
#[command(name = "curator")]
#[command(about = "Promote fine-tuned adapters and extracted links through a policy gate")]
#[command(version)]
#[command(
    long_about = "curator scores produced artifacts (ROI for fine-tuned adapters, confidence for extracted links) and gates them against the thresholds in a request manifest.\n\nExample usage:\n  curator run --manifest request.yaml --measurements bench.json --registry ./registry"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run one manifest through the pipeline and print the report as JSON.
    Run(RunArgs),

    /// List the jobs and artifacts of a persisted registry.
    Inspect(InspectArgs),
}

/// Arguments for `curator run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Manifest file (.json, .yaml or .yml).
    #[arg(short = 'm', long)]
    pub manifest: PathBuf,

    /// JSON array of input records ({"content": "...", "prompt": "..."}).
    #[arg(long)]
    pub records: Option<PathBuf>,

    /// JSON object of benchmark measurements reported for the artifact.
    /// Defaults to the configured baseline.
    #[arg(long)]
    pub measurements: Option<PathBuf>,

    /// Registry directory; loaded before the run and saved after it.
    #[arg(short = 'r', long)]
    pub registry: Option<PathBuf>,

    /// Print Prometheus metrics to stderr after the report.
    #[arg(long)]
    pub metrics: bool,
}

/// Arguments for `curator inspect`.
#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Registry directory.
    #[arg(short = 'r', long)]
    pub registry: PathBuf,

    /// Output the snapshot as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_manifest_command(args).await,
        Commands::Inspect(args) => run_inspect_command(args).await,
    }
}

// ============================================================================
// Run Command Implementation
// ============================================================================

async fn run_manifest_command(args: RunArgs) -> anyhow::Result<()> {
    let manifest = Manifest::from_file(&args.manifest)?;

    let mut config = PipelineConfig::from_env()?;
    if let Some(dir) = &args.registry {
        config = config.with_registry_path(dir.clone());
    }

    let registry = match &config.registry_path {
        Some(dir) => Registry::load(dir).await?,
        None => Registry::new(),
    };

    let records = match &args.records {
        Some(path) => load_records(path)?,
        None => sample_records(),
    };
    let measurements = match &args.measurements {
        Some(path) => load_measurements(path)?,
        None => config.baseline.clone(),
    };

    let collaborators = Collaborators {
        source: Arc::new(StaticSource::new(records)),
        executor: Arc::new(ScriptedExecutor::new()),
        scorer: Arc::new(FixedScorer::new(measurements)),
        graph: Arc::new(MemoryGraphSink::new()),
    };

    let metrics = if args.metrics {
        Some(Arc::new(CuratorMetrics::new()?))
    } else {
        None
    };
    let collector = metrics
        .as_ref()
        .map(|m| MetricsCollector::new(Arc::clone(m)))
        .unwrap_or_default();

    let curator = Curator::new(config, Arc::new(registry), collaborators)?.with_metrics(collector);

    info!(
        manifest = %args.manifest.display(),
        correlation_id = %manifest.correlation_id,
        "Running manifest"
    );
    let report = curator.run_pipeline(&manifest).await?;

    if let Some(path) = curator.persist().await? {
        info!(path = %path.display(), "Registry saved");
    }

    let json_output = serde_json::to_string_pretty(&report)
        .map_err(|e| anyhow::anyhow!("Failed to serialize report JSON: {}", e))?;
    println!("{}", json_output);

    if let Some(metrics) = metrics {
        eprintln!("{}", metrics.export());
    }

    if report.is_failure() {
        warn!(summary = %report.summary, "Run failed");
    }

    Ok(())
}

fn load_records(path: &Path) -> anyhow::Result<Vec<Record>> {
    let content = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read records {}: {}", path.display(), e))?;
    let records: Vec<Record> = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Invalid records file {}: {}", path.display(), e))?;
    Ok(records)
}

fn load_measurements(path: &Path) -> anyhow::Result<Measurements> {
    let content = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read measurements {}: {}", path.display(), e))?;
    let measurements: Measurements = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Invalid measurements file {}: {}", path.display(), e))?;
    Ok(measurements)
}

fn sample_records() -> Vec<Record> {
    vec![
        Record::new("OOMKilled: container api exceeded memory limit 512Mi")
            .with_prompt("Why was the api container restarted?"),
        Record::new("upstream connect error or disconnect/reset before headers"),
    ]
}

// ============================================================================
// Inspect Command Implementation
// ============================================================================

async fn run_inspect_command(args: InspectArgs) -> anyhow::Result<()> {
    let registry = Registry::load(&args.registry).await?;
    let snapshot = registry.snapshot().await;

    if args.json {
        let json_output = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| anyhow::anyhow!("Failed to serialize registry JSON: {}", e))?;
        println!("{}", json_output);
        return Ok(());
    }

    println!("Jobs ({}):", snapshot.jobs.len());
    for job in &snapshot.jobs {
        println!(
            "  {}  {:<15} {:<20} cost={}",
            job.id,
            job.state().to_string(),
            job.correlation_id,
            job.cost()
                .map(|c| format!("{:.4}", c))
                .unwrap_or_else(|| "-".to_string())
        );
    }

    println!("Artifacts ({}):", snapshot.artifacts.len());
    for artifact in &snapshot.artifacts {
        println!(
            "  {}  {:<12} job={} score={}",
            artifact.id,
            artifact.state().to_string(),
            artifact.job_id,
            artifact
                .decision_score()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string())
        );
    }

    Ok(())
}
