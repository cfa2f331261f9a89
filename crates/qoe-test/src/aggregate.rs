//! Per-tick verdicts and the averaged scenario summary.
//!
//! For every aligned tick the aggregator derives the observed bitrate loss and
//! its delta to the link's effective quality score, writes one detail row, and
//! folds the tick into a [`RunningAccumulator`]. The first two ticks are warm-up
//! and never accumulated. The final row is the accumulator's average, or all
//! `N/A` when nothing qualified.
//!
//! The per-tick verdict compares the signed delta; the summary verdict compares
//! the mean of absolute deltas.

use crate::aligner::{AlignedSample, SampleAligner};
use crate::error::Result;
use crate::telemetry::{NA, TelemetryCategory};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const TIME: &str = "time [sec]";
pub const NOMINAL_BITRATE: &str = "nominal bit rate [Kbps]";
pub const EXTERNAL_AP_LOAD: &str = "external AP load [Kbps]";
pub const EXTERNAL_AP_CHANNEL: &str = "external AP channel";
pub const BITRATE_LOSS: &str = "actual bitrate loss [%]";
pub const DELTA: &str = "delta [%] (tx_link_effective_quality_score-actual bitrate loss)";
pub const TEST_RESULT: &str = "test result";

/// Ticks at the start of every series that never enter the average.
pub const WARM_UP_TICKS: usize = 2;

/// A detail column copied from one telemetry field.
#[derive(Debug, Clone, Copy)]
pub struct TelemetryColumn {
    pub name: &'static str,
    pub category: TelemetryCategory,
    pub field: &'static str,
    /// Whether the summary row carries its average
    pub averaged: bool,
}

const fn column(
    name: &'static str,
    category: TelemetryCategory,
    field: &'static str,
    averaged: bool,
) -> TelemetryColumn {
    TelemetryColumn {
        name,
        category,
        field,
        averaged,
    }
}

/// Telemetry columns of the detail file, in order.
pub const TELEMETRY_COLUMNS: [TelemetryColumn; 20] = {
    use TelemetryCategory::{AirMonitoring, AirScoring, LinkMonitoring, LinkScoring};
    [
        column("tx_link_effective_quality_score [%]", LinkScoring, "tx_link_effective_quality_score", true),
        column("tx_link_quality_score [%]", LinkScoring, "tx_link_quality_score", true),
        column("tx_retry_score [%]", LinkScoring, "tx_retry_score", true),
        column("tx_phyrate_score [%]", LinkScoring, "tx_phyrate_score", true),
        column("channel_cca_user_impact [%]", LinkScoring, "channel_cca_user_impact", true),
        column("channel", AirScoring, "channel", false),
        column("channel_cca_score [%]", AirScoring, "channel_cca_score", true),
        column("channel_load [%]", AirScoring, "channel_load", true),
        column("tx_ineff [%]", AirScoring, "tx_ineff", true),
        column("channel_noise [%]", AirScoring, "channel_noise", true),
        column("wifi_scoring/air_data.interference [%]", AirScoring, "interference", true),
        column("datarate [Kbps]", LinkMonitoring, "datarate", true),
        column("rtr [%]", LinkMonitoring, "rtr", true),
        column("tx_phyrate_avg [Kbps]", LinkMonitoring, "tx_phyrate_avg", true),
        column("tx_bytes_total [B]", LinkMonitoring, "tx_bytes_total", true),
        column("rssi", LinkMonitoring, "rssi", true),
        column("air_load [%]", AirMonitoring, "air_load", true),
        column("txop [%]", AirMonitoring, "txop", true),
        column("noise [dB]", AirMonitoring, "noise", true),
        column("wifi_monitoring/air_data.interference [%]", AirMonitoring, "interference", true),
    ]
};

/// Column names of the detail file.
pub fn detail_header() -> Vec<&'static str> {
    let mut header = vec![
        TIME,
        NOMINAL_BITRATE,
        EXTERNAL_AP_LOAD,
        EXTERNAL_AP_CHANNEL,
        BITRATE_LOSS,
        DELTA,
        TEST_RESULT,
    ];
    header.extend(TELEMETRY_COLUMNS.iter().map(|c| c.name));
    header
}

/// Pass/fail outcome against the tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    /// `Pass` when `|delta| <= tolerance`.
    pub fn judge(delta: f64, tolerance: f64) -> Self {
        if delta.abs() <= tolerance {
            Verdict::Pass
        } else {
            Verdict::Fail
        }
    }

    /// Detail-row marker; passing ticks are left blank.
    pub fn marker(self) -> &'static str {
        match self {
            Verdict::Pass => "",
            Verdict::Fail => "Failed!",
        }
    }

    /// Summary-row label.
    pub fn label(self) -> &'static str {
        match self {
            Verdict::Pass => "Passed!",
            Verdict::Fail => "Failed!",
        }
    }
}

/// Metrics derived for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedMetrics {
    /// `(nominal - observed) / nominal * 100`
    pub bitrate_loss: f64,
    /// `effective_quality_score - bitrate_loss`
    pub delta: f64,
    pub verdict: Verdict,
}

impl DerivedMetrics {
    /// Derive tick metrics, or `None` if an input is not numeric or the
    /// nominal bitrate is zero.
    pub fn compute(
        nominal_bitrate: u64,
        observed_datarate: &str,
        effective_quality_score: &str,
        tolerance: f64,
    ) -> Option<Self> {
        if nominal_bitrate == 0 {
            return None;
        }
        let observed: f64 = observed_datarate.trim().parse().ok()?;
        let score: f64 = effective_quality_score.trim().parse().ok()?;
        let nominal = nominal_bitrate as f64;

        let bitrate_loss = (nominal - observed) / nominal * 100.0;
        let delta = score - bitrate_loss;
        Some(Self {
            bitrate_loss,
            delta,
            verdict: Verdict::judge(delta, tolerance),
        })
    }
}

/// Running sums for one (scenario, band), keyed by column name.
#[derive(Debug, Default)]
pub struct RunningAccumulator {
    sums: BTreeMap<&'static str, f64>,
    abs_delta: f64,
    count: usize,
}

impl RunningAccumulator {
    /// Fold one qualifying tick. Non-numeric telemetry cells count as zero.
    pub fn add(&mut self, metrics: &DerivedMetrics, sample: &AlignedSample) {
        *self.sums.entry(BITRATE_LOSS).or_default() += metrics.bitrate_loss;
        for column in TELEMETRY_COLUMNS.iter().filter(|c| c.averaged) {
            let value = sample
                .get(column.category, column.field)
                .and_then(|v| v.parse::<f64>().ok())
                .unwrap_or(0.0);
            *self.sums.entry(column.name).or_default() += value;
        }
        self.abs_delta += metrics.delta.abs();
        self.count += 1;
    }

    /// Ticks folded so far.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Consume the accumulator into the summary row and its verdict.
    pub fn finish(self, tolerance: f64) -> (Vec<String>, Option<Verdict>) {
        let header = detail_header();
        if self.count == 0 {
            return (vec![NA.to_string(); header.len()], None);
        }

        let n = self.count as f64;
        let mean_abs_delta = self.abs_delta / n;
        let verdict = Verdict::judge(mean_abs_delta, tolerance);
        let cells = header
            .iter()
            .map(|name| match *name {
                DELTA => format_float(mean_abs_delta),
                TEST_RESULT => verdict.label().to_string(),
                other => self
                    .sums
                    .get(other)
                    .map(|sum| format_float(sum / n))
                    .unwrap_or_default(),
            })
            .collect();
        (cells, Some(verdict))
    }
}

/// Command-line parameters of one collection run.
#[derive(Debug, Clone)]
pub struct ScenarioParams {
    pub nominal_bitrate: u64,
    pub external_ap_load: u64,
    pub external_ap_channel: u32,
    pub tolerance: f64,
    pub period_secs: u64,
}

/// Counters for one written detail file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateTally {
    /// Detail rows written, summary excluded
    pub rows: usize,
    /// Ticks folded into the average
    pub accumulated: usize,
    /// Ticks whose metrics could not be derived
    pub errors: usize,
    /// Summary verdict, `None` for an all-`N/A` summary
    pub verdict: Option<Verdict>,
}

/// Result of aggregating one band.
#[derive(Debug, Clone)]
pub struct BandSummary {
    pub band: String,
    pub detail_path: PathBuf,
    pub tally: AggregateTally,
    /// A capture series could not be opened
    pub missing_series: bool,
}

/// Turns aligned samples into the detail file of one (scenario, band).
#[derive(Debug, Clone)]
pub struct MetricsAggregator {
    params: ScenarioParams,
}

impl MetricsAggregator {
    pub fn new(params: ScenarioParams) -> Self {
        Self { params }
    }

    /// Derive metrics for one sample.
    pub fn compute(&self, sample: &AlignedSample) -> Option<DerivedMetrics> {
        let datarate = sample.get(TelemetryCategory::LinkMonitoring, "datarate")?;
        let score = sample.get(TelemetryCategory::LinkScoring, "tx_link_effective_quality_score")?;
        DerivedMetrics::compute(self.params.nominal_bitrate, datarate, score, self.params.tolerance)
    }

    /// Detail row for `tick`.
    pub fn detail_row(
        &self,
        tick: usize,
        metrics: Option<&DerivedMetrics>,
        sample: &AlignedSample,
    ) -> Vec<String> {
        let p = &self.params;
        let mut row = vec![
            (p.period_secs * tick as u64).to_string(),
            p.nominal_bitrate.to_string(),
            p.external_ap_load.to_string(),
            p.external_ap_channel.to_string(),
        ];
        match metrics {
            Some(m) => row.extend([
                format_float(m.bitrate_loss),
                format_float(m.delta),
                m.verdict.marker().to_string(),
            ]),
            None => row.extend([NA.to_string(), NA.to_string(), NA.to_string()]),
        }
        row.extend(TELEMETRY_COLUMNS.iter().map(|c| {
            sample
                .get(c.category, c.field)
                .unwrap_or_default()
                .to_string()
        }));
        row
    }

    /// Write header, at most `tick_limit` detail rows and the summary row.
    pub fn write<W: Write>(
        &self,
        samples: impl IntoIterator<Item = AlignedSample>,
        tick_limit: usize,
        out: &mut W,
    ) -> io::Result<AggregateTally> {
        writeln!(out, "{}", detail_header().join(","))?;

        let mut acc = RunningAccumulator::default();
        let mut tally = AggregateTally::default();
        for (tick, sample) in samples.into_iter().take(tick_limit).enumerate() {
            let metrics = self.compute(&sample);
            match &metrics {
                Some(m) if tick >= WARM_UP_TICKS => acc.add(m, &sample),
                Some(_) => {}
                None => tally.errors += 1,
            }
            writeln!(out, "{}", self.detail_row(tick, metrics.as_ref(), &sample).join(","))?;
            tally.rows += 1;
        }

        tally.accumulated = acc.count();
        let (summary, verdict) = acc.finish(self.params.tolerance);
        writeln!(out, "{}", summary.join(","))?;
        tally.verdict = verdict;
        Ok(tally)
    }

    /// Aggregate the captures of `band` under `raw_dir` into `detail_path`.
    ///
    /// A missing capture series is logged and yields a header plus an all-`N/A`
    /// summary.
    pub fn aggregate_band(
        &self,
        raw_dir: &Path,
        band: &str,
        tick_limit: usize,
        detail_path: &Path,
    ) -> Result<BandSummary> {
        let mut out = BufWriter::new(File::create(detail_path)?);
        let (tally, missing_series) = match SampleAligner::open(raw_dir, band) {
            Ok(aligner) => (self.write(aligner, tick_limit, &mut out)?, false),
            Err(e) => {
                error!("An error occurred: {}", e);
                (self.write(std::iter::empty(), 0, &mut out)?, true)
            }
        };
        out.flush()?;

        if !missing_series {
            info!("{} was generated.", detail_path.display());
        }
        Ok(BandSummary {
            band: band.to_string(),
            detail_path: detail_path.to_path_buf(),
            tally,
            missing_series,
        })
    }
}

/// Append `"{output}.csv: {n} error(s) detected"` to the error log.
pub fn record_errors(error_log: &Path, output: &Path, errors: usize) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(error_log)?;
    writeln!(file, "{}.csv: {} error(s) detected", output.display(), errors)?;
    Ok(())
}

/// Render a float the way the detail files always have: shortest round-trip
/// representation, with `.0` kept on integral values.
pub fn format_float(value: f64) -> String {
    format!("{value:?}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aligner::tests::{row, write_series};
    use crate::aligner::ALIGNED_CATEGORIES;
    use tempfile::TempDir;

    fn params() -> ScenarioParams {
        ScenarioParams {
            nominal_bitrate: 1000,
            external_ap_load: 500,
            external_ap_channel: 6,
            tolerance: 10.0,
            period_secs: 30,
        }
    }

    fn sample(datarate: &str, score: &str) -> AlignedSample {
        let cells = |category: TelemetryCategory, overrides: &[(&str, &str)]| -> Vec<String> {
            row(category, overrides)
                .split(',')
                .map(str::to_string)
                .collect()
        };
        AlignedSample::new([
            cells(
                TelemetryCategory::LinkScoring,
                &[("tx_link_effective_quality_score", score)],
            ),
            cells(TelemetryCategory::AirScoring, &[("channel", "6")]),
            cells(TelemetryCategory::LinkMonitoring, &[("datarate", datarate)]),
            cells(TelemetryCategory::AirMonitoring, &[]),
        ])
    }

    fn run(samples: Vec<AlignedSample>, tick_limit: usize) -> (Vec<Vec<String>>, AggregateTally) {
        let mut out = Vec::new();
        let tally = MetricsAggregator::new(params())
            .write(samples, tick_limit, &mut out)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        let rows = text
            .lines()
            .map(|l| l.split(',').map(str::to_string).collect())
            .collect();
        (rows, tally)
    }

    #[test]
    fn test_loss_and_delta() {
        let m = DerivedMetrics::compute(1000, "900", "85", 10.0).unwrap();
        assert_eq!(m.bitrate_loss, 10.0);
        assert_eq!(m.delta, 75.0);
        assert_eq!(m.verdict, Verdict::Fail);
        assert_eq!(m.verdict.marker(), "Failed!");
    }

    #[test]
    fn test_verdict_markers() {
        assert_eq!(Verdict::judge(75.0, 10.0).marker(), "Failed!");
        assert_eq!(Verdict::judge(5.0, 10.0).marker(), "");
        assert_eq!(Verdict::judge(-10.0, 10.0), Verdict::Pass);
        assert_eq!(Verdict::Pass.label(), "Passed!");
    }

    #[test]
    fn test_conversion_failures() {
        assert!(DerivedMetrics::compute(1000, "N/A", "85", 10.0).is_none());
        assert!(DerivedMetrics::compute(1000, "900", "", 10.0).is_none());
        assert!(DerivedMetrics::compute(0, "900", "85", 10.0).is_none());
    }

    #[test]
    fn test_detail_header_width() {
        let header = detail_header();
        assert_eq!(header.len(), 27);
        assert_eq!(header[0], TIME);
        assert_eq!(header[7], "tx_link_effective_quality_score [%]");
        assert_eq!(header[26], "wifi_monitoring/air_data.interference [%]");
    }

    #[test]
    fn test_three_ticks_accumulate_one() {
        let samples = vec![
            sample("100", "0"),
            sample("200", "0"),
            sample("900", "85"),
        ];
        let (rows, tally) = run(samples, 3);

        assert_eq!(tally.rows, 3);
        assert_eq!(tally.accumulated, 1);
        assert_eq!(rows.len(), 5);
        let summary = &rows[4];
        assert_eq!(summary.len(), 27);
        // only the third tick is averaged
        assert_eq!(summary[4], "10.0");
        assert_eq!(summary[5], "75.0");
        assert_eq!(summary[6], "Failed!");
        assert_eq!(summary[18], "900.0");
        assert_eq!(summary[0], "");
        assert_eq!(summary[12], "");
    }

    #[test]
    fn test_detail_row_layout() {
        let (rows, _) = run(vec![sample("900", "85"), sample("995", "4.5")], 2);

        assert_eq!(rows[1][..7], ["0", "1000", "500", "6", "10.0", "75.0", "Failed!"]);
        assert_eq!(rows[1][18], "900");
        assert_eq!(rows[2][0], "30");
        assert_eq!(rows[2][6], "");
        assert_eq!(rows[2][12], "6");
    }

    #[test]
    fn test_summary_uses_mean_absolute_delta() {
        // deltas: warm-up, warm-up, +5, -5
        let samples = vec![
            sample("900", "85"),
            sample("900", "85"),
            sample("900", "15"),
            sample("900", "5"),
        ];
        let (rows, tally) = run(samples, 4);
        let summary = rows.last().unwrap();
        assert_eq!(summary[5], "5.0");
        assert_eq!(summary[6], "Passed!");
        assert_eq!(tally.verdict, Some(Verdict::Pass));
    }

    #[test]
    fn test_conversion_error_writes_na_and_skips_average() {
        let samples = vec![
            sample("900", "85"),
            sample("900", "85"),
            sample("N/A", "85"),
            sample("950", "2"),
        ];
        let (rows, tally) = run(samples, 4);

        assert_eq!(tally.errors, 1);
        assert_eq!(tally.accumulated, 1);
        assert_eq!(rows[3][4..7], ["N/A", "N/A", "N/A"]);
        assert_eq!(rows[3][18], "N/A");
        assert_eq!(rows.last().unwrap()[4], "5.0");
    }

    #[test]
    fn test_no_qualifying_ticks_gives_na_summary() {
        let (rows, tally) = run(vec![sample("900", "85"), sample("900", "85")], 2);
        assert_eq!(tally.verdict, None);
        let summary = rows.last().unwrap();
        assert_eq!(summary.len(), 27);
        assert!(summary.iter().all(|c| c == NA));
    }

    #[test]
    fn test_tick_limit_bounds_rows() {
        let samples = vec![sample("900", "85"); 6];
        let (rows, tally) = run(samples, 4);
        assert_eq!(tally.rows, 4);
        assert_eq!(rows.len(), 6);
    }

    #[test]
    fn test_short_series_stops_band_aggregation() {
        let tmp = TempDir::new().unwrap();
        for (category, count) in ALIGNED_CATEGORIES.into_iter().zip([10, 10, 9, 10]) {
            let line = match category {
                TelemetryCategory::LinkMonitoring => row(category, &[("datarate", "900")]),
                TelemetryCategory::LinkScoring => {
                    row(category, &[("tx_link_effective_quality_score", "12")])
                }
                _ => row(category, &[]),
            };
            write_series(tmp.path(), category, "2.4GHz", &vec![line; count]);
        }
        let detail = tmp.path().join("TP1_2.4GHz.csv");

        let summary = MetricsAggregator::new(params())
            .aggregate_band(tmp.path(), "2.4GHz", 10, &detail)
            .unwrap();

        assert_eq!(summary.tally.rows, 9);
        assert_eq!(summary.tally.accumulated, 7);
        assert_eq!(summary.tally.verdict, Some(Verdict::Pass));
        let text = std::fs::read_to_string(&detail).unwrap();
        assert_eq!(text.lines().count(), 11);
        assert!(text.lines().last().unwrap().contains("Passed!"));
    }

    #[test]
    fn test_missing_series_writes_na_summary() {
        let tmp = TempDir::new().unwrap();
        let detail = tmp.path().join("TP2_5GHz.csv");

        let summary = MetricsAggregator::new(params())
            .aggregate_band(tmp.path(), "5GHz", 10, &detail)
            .unwrap();

        assert!(summary.missing_series);
        let text = std::fs::read_to_string(&detail).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], vec![NA; 27].join(","));
    }

    #[test]
    fn test_error_log_line() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("errors.log");
        record_errors(&log, Path::new("work/TP1"), 3).unwrap();
        record_errors(&log, Path::new("work/TP2"), 1).unwrap();
        assert_eq!(
            std::fs::read_to_string(&log).unwrap(),
            "work/TP1.csv: 3 error(s) detected\nwork/TP2.csv: 1 error(s) detected\n"
        );
    }
}
