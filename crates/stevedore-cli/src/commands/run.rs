//! `stevedored run` — Deploy a manifest and supervise it until Ctrl+C.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use serde::Deserialize;
use stevedore_common::config::NodeConfig;
use stevedore_common::types::{ResourceSample, ServiceSpec, ServiceStatus};
use stevedore_runtime::container::ServiceSnapshot;
use stevedore_runtime::{Engine, SampleCallback, StatusCallback};

use crate::output::{format_bytes, format_cpu};

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Manifest listing the services to deploy (JSON or YAML).
    #[arg(default_value = "services.yaml")]
    pub manifest: PathBuf,

    /// Resource monitoring interval in seconds; overrides the configuration.
    #[arg(long, env = "STEVEDORE_MONITOR_INTERVAL")]
    pub monitor_interval: Option<u64>,
}

/// Services deployed by `run`.
#[derive(Debug, Deserialize)]
pub struct Manifest {
    /// Deploy requests, in deploy order.
    pub services: Vec<ServiceSpec>,
}

const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Reads a manifest, choosing the format from the file extension.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_manifest(path: &Path) -> anyhow::Result<Manifest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Manifest not found: {}", path.display()))?;
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
    let manifest = if is_yaml {
        serde_yaml::from_str(&content)?
    } else {
        serde_json::from_str(&content)?
    };
    Ok(manifest)
}

/// Executes the `run` command.
///
/// # Errors
///
/// Returns an error if the manifest is invalid or the engine cannot start.
/// Individual deploy failures are reported and do not stop the agent.
pub async fn execute(args: RunArgs, config: NodeConfig) -> anyhow::Result<()> {
    let manifest = load_manifest(&args.manifest)?;
    let interval = args
        .monitor_interval
        .map_or_else(|| config.monitoring_interval(), Duration::from_secs);

    eprintln!();
    eprintln!("  {BOLD}Stevedore{RESET} {DIM}v{}{RESET}", env!("CARGO_PKG_VERSION"));
    eprintln!();

    let engine = Engine::connect(config).await?;
    if engine.recovered() > 0 {
        eprintln!("  Removed {} leftover container(s).", engine.recovered());
    }
    let monitor = engine.resource_monitoring(interval, sample_logger());

    let on_status = status_logger();
    let mut deployed = 0usize;
    for spec in manifest.services {
        let task_id = spec.task_id();
        match engine.deploy(spec, Arc::clone(&on_status)).await {
            Ok(()) => {
                deployed += 1;
                eprintln!("  {GREEN}✓{RESET} {task_id}");
            }
            Err(e) => eprintln!("  {RED}✗{RESET} {task_id}: {e}"),
        }
    }
    eprintln!();
    eprintln!("  {deployed} service(s) running. Press {BOLD}Ctrl+C{RESET} to stop.");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;

    eprintln!();
    eprintln!("  Stopping services...");
    if let Some(monitor) = monitor {
        monitor.abort();
    }
    engine.shutdown().await;
    eprintln!("  {GREEN}All services stopped.{RESET}");
    Ok(())
}

fn status_logger() -> StatusCallback {
    Arc::new(|snapshot: ServiceSnapshot| {
        let task_id = snapshot.task_id();
        if snapshot.status == ServiceStatus::Failed {
            tracing::error!(task_id = %task_id, detail = %snapshot.status_detail, "service failed");
        } else {
            tracing::info!(task_id = %task_id, status = %snapshot.status, detail = %snapshot.status_detail, "service ended");
        }
    })
}

fn sample_logger() -> SampleCallback {
    Arc::new(|batch: Vec<ResourceSample>| {
        for sample in &batch {
            tracing::info!(
                service = %sample.service_name,
                instance = sample.instance,
                pid = sample.pid,
                cpu = %format_cpu(sample.cpu),
                memory = %format_bytes(sample.memory),
                disk = %format_bytes(sample.disk),
                "resource usage"
            );
        }
    })
}
