//! `qoe-collect`: poll the scoring API for one scenario and write the
//! per-band detail files.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use wifi_qoe_test::{
    CollectArgs, Collector, HttpTelemetryClient, config::DEFAULT_API_URL, logging,
};

#[derive(Parser)]
#[command(name = "qoe-collect")]
#[command(about = "Collect WiFi scoring telemetry and judge one scenario")]
#[command(version)]
struct Cli {
    /// Nominal DUT bitrate in Kbps
    #[arg(long)]
    dut_bitrate: u64,

    /// Interferer load in Kbps
    #[arg(long)]
    external_ap_load: u64,

    #[arg(long)]
    external_ap_channel: u32,

    /// Seconds between samples
    #[arg(long, default_value = "30")]
    period: u64,

    /// Accepted bitrate-loss tolerance in percent
    #[arg(long, default_value = "10.0")]
    tolerance: f64,

    /// Maximal collection time in seconds
    #[arg(long, default_value = "1200")]
    duration: u64,

    #[arg(long, default_value = DEFAULT_API_URL)]
    url: String,

    #[arg(long, default_value = "output.csv")]
    output: PathBuf,

    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn collect_args(&self) -> CollectArgs {
        CollectArgs {
            dut_bitrate: self.dut_bitrate,
            external_ap_load: self.external_ap_load,
            external_ap_channel: self.external_ap_channel,
            duration_secs: self.duration,
            period_secs: self.period,
            tolerance: self.tolerance,
            url: self.url.clone(),
            output: self.output.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let args = cli.collect_args();
    args.validate()?;

    info!("Running with arguments:");
    info!("--url {}", args.url);
    info!("--period {}", args.period_secs);
    info!("--output {}", args.output.display());
    info!("--dut-bitrate {}", args.dut_bitrate);
    info!("--external-ap-load {}", args.external_ap_load);
    info!("--external-ap-channel {}", args.external_ap_channel);
    info!("--tolerance {}", args.tolerance);
    info!("--duration {}", args.duration_secs);
    info!("(Ctrl+C to exit)");

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, summarising what was captured");
            trigger.cancel();
        }
    });

    let client = HttpTelemetryClient::new(&args.url)?;
    let report = Collector::new(client, args, cancel).run().await?;

    println!("Start: {}", report.started.format("%H:%M:%S"));
    println!("Stop: {}", report.stopped.format("%H:%M:%S"));
    println!("Iterations: {}", report.iterations);
    for band in &report.bands {
        let verdict = band
            .tally
            .verdict
            .map(|v| v.label())
            .unwrap_or(wifi_qoe_test::telemetry::NA);
        println!("{}: {} ({})", band.band, verdict, band.detail_path.display());
    }
    if report.errors() > 0 {
        println!("Errors: {}", report.errors());
    }

    Ok(())
}
