//! Standalone telemetry collection for one scenario.
//!
//! A bootstrap poll (tick 0) fixes the bands and writes the capture headers;
//! after that one tick is captured every `period` until `duration` has elapsed
//! or the run is interrupted. An interrupted run still aggregates whatever it
//! captured. Aggregation covers the bands discovered for link scoring and
//! stops at `iterations - 1` ticks.
//!
//! Files written for `--output work/TP1`:
//!
//! ```text
//! work/raw/TP1/wifi_scoring.link_data_2.4GHz.csv   raw captures, one per (category, band)
//! work/TP1_2.4GHz.csv                             detail rows + summary, one per band
//! work/errors.log                                 conversion error counts
//! ```

use crate::aggregate::{BandSummary, MetricsAggregator, ScenarioParams, record_errors};
use crate::error::{QoeError, Result};
use crate::telemetry::{TelemetryCategory, TelemetryFetcher, TelemetryRecorder};
use crate::wait;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Name of the per-directory error log.
pub const ERROR_LOG: &str = "errors.log";

/// Parameters of one collection run.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectArgs {
    /// Nominal DUT bitrate in Kbps
    pub dut_bitrate: u64,
    /// Interferer load in Kbps
    pub external_ap_load: u64,
    pub external_ap_channel: u32,
    pub duration_secs: u64,
    pub period_secs: u64,
    /// Accepted |delta| in percentage points
    pub tolerance: f64,
    /// Scoring/monitoring API base URL
    pub url: String,
    /// Output path; a trailing `.csv` is ignored
    pub output: PathBuf,
}

impl CollectArgs {
    /// Reject values the collection loop cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.tolerance) {
            return Err(QoeError::Config(
                "--tolerance should be in the range [0, 100]".to_string(),
            ));
        }
        if self.duration_secs == 0 {
            return Err(QoeError::Config(
                "--duration should be positive integer".to_string(),
            ));
        }
        if self.period_secs == 0 {
            return Err(QoeError::Config(
                "--period should be positive integer".to_string(),
            ));
        }
        Ok(())
    }

    /// Aggregation parameters.
    pub fn params(&self) -> ScenarioParams {
        ScenarioParams {
            nominal_bitrate: self.dut_bitrate,
            external_ap_load: self.external_ap_load,
            external_ap_channel: self.external_ap_channel,
            tolerance: self.tolerance,
            period_secs: self.period_secs,
        }
    }

    /// Output path without a trailing `.csv`.
    pub fn output_base(&self) -> PathBuf {
        let text = self.output.to_string_lossy();
        match text.strip_suffix(".csv") {
            Some(base) => PathBuf::from(base),
            None => self.output.clone(),
        }
    }

    /// Directory holding the detail files and the error log.
    pub fn output_dir(&self) -> PathBuf {
        self.output_base()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    /// Directory holding the raw captures of this run.
    pub fn raw_dir(&self) -> PathBuf {
        let base = self.output_base();
        let stem = base.file_name().map(PathBuf::from).unwrap_or_default();
        self.output_dir().join("raw").join(stem)
    }

    /// Detail file for `band`.
    pub fn detail_path(&self, band: &str) -> PathBuf {
        let base = self.output_base();
        PathBuf::from(format!("{}_{}.csv", base.display(), band))
    }
}

/// What one collection run produced.
#[derive(Debug, Clone)]
pub struct CollectionReport {
    pub started: DateTime<Local>,
    pub stopped: DateTime<Local>,
    /// Polling iterations after the bootstrap tick
    pub iterations: usize,
    pub interrupted: bool,
    pub bands: Vec<BandSummary>,
}

impl CollectionReport {
    /// Conversion errors across all bands.
    pub fn errors(&self) -> usize {
        self.bands.iter().map(|b| b.tally.errors).sum()
    }
}

/// Polling loop plus aggregation.
pub struct Collector<F> {
    fetcher: F,
    args: CollectArgs,
    cancel: CancellationToken,
}

impl<F: TelemetryFetcher> Collector<F> {
    pub fn new(fetcher: F, args: CollectArgs, cancel: CancellationToken) -> Self {
        Self {
            fetcher,
            args,
            cancel,
        }
    }

    /// Capture until the duration elapses or the run is cancelled, then
    /// aggregate every band.
    pub async fn run(&self) -> Result<CollectionReport> {
        let started = Local::now();
        let output_dir = self.args.output_dir();
        if !output_dir.as_os_str().is_empty() {
            tokio::fs::create_dir_all(&output_dir).await?;
        }
        let mut recorder = TelemetryRecorder::create(self.args.raw_dir())?;

        for category in TelemetryCategory::ALL {
            let payload = self.fetcher.poll(category).await;
            recorder.bootstrap(category, &payload)?;
            recorder.capture_tick(category, &payload)?;
        }

        let (iterations, interrupted) = self.poll_loop(&mut recorder).await?;
        let stopped = Local::now();

        let bands = self.aggregate(&recorder, iterations)?;
        let report = CollectionReport {
            started,
            stopped,
            iterations,
            interrupted,
            bands,
        };

        let errors = report.errors();
        if errors > 0 {
            record_errors(
                &output_dir.join(ERROR_LOG),
                &self.args.output_base(),
                errors,
            )?;
        }
        Ok(report)
    }

    async fn poll_loop(&self, recorder: &mut TelemetryRecorder) -> Result<(usize, bool)> {
        let period = Duration::from_secs(self.args.period_secs);
        let duration = Duration::from_secs(self.args.duration_secs);
        let start = Instant::now();
        let mut iterations = 0;

        loop {
            if wait::pause(&self.cancel, period).await.is_err() {
                info!("collection interrupted after {} iteration(s)", iterations);
                return Ok((iterations, true));
            }
            iterations += 1;
            // a started tick is always completed so every series gets its row
            for category in TelemetryCategory::ALL {
                let payload = self.fetcher.poll(category).await;
                recorder.capture_tick(category, &payload)?;
            }
            if start.elapsed() >= duration {
                return Ok((iterations, false));
            }
        }
    }

    fn aggregate(
        &self,
        recorder: &TelemetryRecorder,
        iterations: usize,
    ) -> Result<Vec<BandSummary>> {
        let aggregator = MetricsAggregator::new(self.args.params());
        let tick_limit = iterations.saturating_sub(1);

        recorder
            .bands(TelemetryCategory::LinkScoring)
            .iter()
            .map(|band| {
                let summary = aggregator.aggregate_band(
                    recorder.dir(),
                    band,
                    tick_limit,
                    &self.args.detail_path(band),
                )?;
                if summary.tally.errors > 0 {
                    warn!(
                        "{}: {} error(s) detected",
                        summary.detail_path.display(),
                        summary.tally.errors
                    );
                }
                Ok(summary)
            })
            .collect()
    }
}
