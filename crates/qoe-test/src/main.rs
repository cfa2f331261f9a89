//! `qoe-executor`: run a WiFi QoE test matrix end to end.

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use wifi_qoe_test::{
    BatchRunner, ExecutorConfig, HttpTelemetryClient, RemoteExecutor, ScenarioOrchestrator,
    SerialConsoleDriver, SshConnector, SubprocessCollector, load_matrix, logging,
    telemetry::work_dir_name, write_rollup,
};

#[derive(Parser)]
#[command(name = "qoe-executor")]
#[command(about = "Run a WiFi QoE regression test matrix")]
#[command(version)]
struct Cli {
    /// Harness configuration file (YAML)
    #[arg(long, default_value = "qoe_executor.yaml")]
    config: PathBuf,

    /// Test matrix file
    #[arg(long, default_value = "tests.csv")]
    tests: PathBuf,

    /// Seconds to wait before each data collection (overrides the config)
    #[arg(long)]
    delay_before_start: Option<u64>,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let mut config = ExecutorConfig::load(&cli.config)
        .with_context(|| format!("--config {}", cli.config.display()))?;
    if let Some(secs) = cli.delay_before_start {
        config.timing.pre_collection_delay = Duration::from_secs(secs);
    }
    let scenarios =
        load_matrix(&cli.tests).with_context(|| format!("--tests {}", cli.tests.display()))?;

    info!("Running with arguments:");
    info!("--config {}", cli.config.display());
    info!("--tests {}", cli.tests.display());
    info!(
        "--delay-before-start {}",
        config.timing.pre_collection_delay.as_secs()
    );
    info!("(Ctrl+C to exit)");

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing current step");
            trigger.cancel();
        }
    });

    let release = HttpTelemetryClient::new(&config.management_url)?
        .framework_release()
        .await;
    let work_dir = PathBuf::from(work_dir_name(Local::now().date_naive(), &release));

    let launcher = match &config.collector_bin {
        Some(path) => SubprocessCollector::new(path),
        None => SubprocessCollector::beside_current_exe()?,
    };
    info!("collector: {}", launcher.program().display());

    let config = Arc::new(config);
    let exec = RemoteExecutor::new(Arc::new(SshConnector), config.retry, cancel.clone());
    let orchestrator = ScenarioOrchestrator::new(
        exec.clone(),
        Arc::clone(&config),
        Arc::new(launcher),
        work_dir.clone(),
        cancel.clone(),
    );
    let serial = SerialConsoleDriver::system(config.maintenance.serial_settle);
    let runner = BatchRunner::new(orchestrator, serial, exec, Arc::clone(&config), cancel);

    let started = Local::now();
    println!("Start: {}", started.format("%H:%M:%S"));
    println!("Scenarios: {}", scenarios.len());
    println!("Work directory: {}", work_dir.display());
    println!();

    let report = runner.run(&scenarios).await;

    for (scenario_id, reason) in &report.failed {
        error!("{}: {}", scenario_id, reason);
    }
    if work_dir.is_dir() {
        let summary = work_dir.join("summary.csv");
        match write_rollup(&work_dir, &summary) {
            Ok(rollup) => info!("{} row(s) in {}", rollup.rows, summary.display()),
            Err(e) => error!("cannot build {}: {}", summary.display(), e),
        }
    }

    let stopped = Local::now();
    println!();
    println!("Start: {}", started.format("%H:%M:%S"));
    println!("Stop: {}", stopped.format("%H:%M:%S"));
    println!(
        "Completed: {}  Failed: {}  Reboots: {}{}",
        report.completed.len(),
        report.failed.len(),
        report.reboots,
        if report.interrupted { "  (interrupted)" } else { "" }
    );
    println!("Run time: {}s", (stopped - started).num_seconds());

    Ok(())
}
