//! `qoe-summary`: roll per-scenario summary rows into one table.

use anyhow::{Result, bail};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use wifi_qoe_test::{logging, write_rollup};

#[derive(Parser)]
#[command(name = "qoe-summary")]
#[command(about = "Build the cross-scenario summary table")]
#[command(version)]
struct Cli {
    /// Directory with the per-scenario detail files
    #[arg(long)]
    dir_path: PathBuf,

    #[arg(long, default_value = "summary.csv")]
    output: PathBuf,

    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    if !cli.dir_path.is_dir() {
        bail!("{} is not directory or not exists", cli.dir_path.display());
    }

    info!("Running with arguments:");
    info!("--dir-path {}", cli.dir_path.display());
    info!("--output {}", cli.output.display());

    let report = write_rollup(&cli.dir_path, &cli.output)?;
    println!("Rows: {}", report.rows);
    if !report.skipped.is_empty() {
        println!("Skipped: {}", report.skipped.len());
    }
    Ok(())
}
