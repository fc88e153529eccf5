//! PowerMax Reconciler CLI
//!
//! Drives the orchestrator against a simulated array seeded from a YAML
//! inventory. Plans and applies read a YAML plan file:
//!
//! ```yaml
//! resources:
//!   - kind: storage_group
//!     id: sg-app
//!     desired:
//!       service_level: Diamond
//!       volume_ids: ["0001A", "0001B"]
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use powermax_reconciler::{
    ApplyReport, BackendFactory, Error, ErrorAction, Orchestrator, PlannedResource, ProviderConfig,
    ResourceKind,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// PowerMax Reconciler - desired-state reconciliation for PowerMax objects
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Provider configuration file
    #[arg(long, env = "POWERMAX_CONFIG", default_value = "powermax.yaml")]
    config: PathBuf,

    /// Write the simulated array back to this inventory file on exit
    #[arg(long, env = "POWERMAX_SAVE_INVENTORY")]
    save_inventory: Option<PathBuf>,

    /// Print prometheus metrics to stderr on exit
    #[arg(long)]
    metrics: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read one resource and print its attributes
    Import {
        #[arg(long)]
        kind: ResourceKind,
        #[arg(long)]
        id: String,
    },
    /// Print the changes a plan file would make
    Plan {
        #[arg(long)]
        file: PathBuf,
    },
    /// Apply a plan file
    Apply {
        #[arg(long)]
        file: PathBuf,
    },
    /// List every masking view
    ListMaskingViews,
    /// List snapshot generations of a storage group
    ListSnapshots {
        #[arg(long)]
        storage_group: String,
    },
}

/// Plan file contents
#[derive(Debug, Deserialize)]
struct PlanFile {
    resources: Vec<PlannedResource>,
}

impl PlanFile {
    fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read plan file {}", path.display()))?;
        serde_yaml::from_str(&raw).with_context(|| format!("invalid plan file {}", path.display()))
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = ProviderConfig::load(&args.config)
        .with_context(|| format!("failed to load config {}", args.config.display()))?;

    info!("Starting PowerMax Reconciler");
    info!("  Version: {}", powermax_reconciler::VERSION);
    info!("  Array: {}", config.array_id);
    info!("  Backend: {}", config.backend);

    if !BackendFactory::is_simulator(&config.backend) {
        bail!("backend {} is not available in this build", config.backend);
    }
    let array =
        Arc::new(BackendFactory::simulator(&config).context("failed to build simulated array")?);
    let orchestrator = Orchestrator::new(&config, array.clone())?;

    let clean = match run(&orchestrator, args.command).await {
        Ok(clean) => clean,
        Err(err) => {
            report_failure(&err);
            return Err(err);
        }
    };

    if let Some(path) = &args.save_inventory {
        std::fs::write(path, array.inventory().to_yaml()?)
            .with_context(|| format!("failed to write inventory {}", path.display()))?;
        info!("Saved inventory to {}", path.display());
    }
    if args.metrics {
        eprintln!("{}", orchestrator.metrics().render()?);
    }

    if !clean {
        bail!("one or more resources were not fully reconciled");
    }
    Ok(())
}

/// Run one command; `false` when some resource did not reconcile cleanly
async fn run(orchestrator: &Orchestrator, command: Command) -> anyhow::Result<bool> {
    match command {
        Command::Import { kind, id } => {
            let observed = orchestrator.import(kind, &id).await?;
            print_json(&observed.value().to_json())?;
            Ok(true)
        }
        Command::Plan { file } => {
            let plan = PlanFile::load(&file)?;
            let mut out = Vec::with_capacity(plan.resources.len());
            for resource in &plan.resources {
                let changes = orchestrator
                    .plan(resource.kind, &resource.id, &resource.desired)
                    .await
                    .with_context(|| format!("failed to plan {}/{}", resource.kind, resource.id))?;
                out.push(json!({
                    "kind": resource.kind,
                    "id": resource.id,
                    "changes": changes,
                }));
            }
            print_json(&out)?;
            Ok(true)
        }
        Command::Apply { file } => {
            let plan = PlanFile::load(&file)?;
            let results = orchestrator.apply_all(plan.resources).await;
            let reports: Vec<ApplyReport> = results
                .iter()
                .map(|(planned, result)| ApplyReport::from_result(planned, result))
                .collect();
            for report in reports.iter().filter(|r| !r.is_clean()) {
                warn!(
                    retryable = report.retryable,
                    "{}/{}: {}", report.kind, report.previous_id, report.summary
                );
            }
            print_json(&reports)?;
            Ok(reports.iter().all(ApplyReport::is_clean))
        }
        Command::ListMaskingViews => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, skipping masking views not yet fetched");
                    on_signal.cancel();
                }
            });

            let listed = orchestrator.list_masking_views(&cancel).await?;
            let views: Vec<_> = listed.views.iter().map(|v| v.to_json()).collect();
            print_json(&json!({
                "masking_views": views,
                "diagnostics": listed.diagnostics,
            }))?;
            Ok(!listed.diagnostics.has_errors())
        }
        Command::ListSnapshots { storage_group } => {
            let snapshots = orchestrator.list_snapshots(&storage_group).await?;
            let out: Vec<_> = snapshots.iter().map(|s| s.to_json()).collect();
            print_json(&out)?;
            Ok(true)
        }
    }
}

/// Tell the operator whether re-running the command can help
fn report_failure(err: &anyhow::Error) {
    match err.downcast_ref::<Error>().map(Error::action) {
        Some(ErrorAction::FixInput) => error!("{:#}; fix the input before re-running", err),
        Some(ErrorAction::RetryAfter(delay)) => {
            warn!("{:#}; re-run in about {}s", err, delay.as_secs())
        }
        Some(ErrorAction::RetryWithBackoff) => {
            warn!("{:#}; re-run once the array is reachable", err)
        }
        None => error!("{:#}", err),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    // stdout carries command output
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
