//! Cross-scenario rollup of per-scenario summary rows.
//!
//! Stateless post-pass over a result directory: every top-level `*.csv` file
//! contributes its last line, mapped onto the rollup columns by header name.
//! Inputs are visited in file-name order, so an unchanged directory always
//! produces the same bytes.

use crate::aggregate::{BITRATE_LOSS, DELTA, TELEMETRY_COLUMNS, TEST_RESULT};
use crate::error::Result;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// First rollup column.
pub const SCENARIO_ID: &str = "scenario_id";

/// Rollup column names, in order.
pub fn rollup_header() -> Vec<&'static str> {
    let mut header = vec![SCENARIO_ID, BITRATE_LOSS, DELTA, TEST_RESULT];
    header.extend(
        TELEMETRY_COLUMNS
            .iter()
            .filter(|c| c.averaged)
            .map(|c| c.name),
    );
    header
}

/// What a rollup pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollupReport {
    pub rows: usize,
    pub skipped: Vec<PathBuf>,
}

/// Summary cells of one detail file, or `None` if it has no summary row.
pub fn summary_row(path: &Path) -> Result<Option<Vec<String>>> {
    let text = fs::read_to_string(path)?;
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let (Some(header), Some(last)) = (lines.first(), lines.last()) else {
        return Ok(None);
    };
    if lines.len() < 2 {
        return Ok(None);
    }

    let cells: HashMap<&str, &str> = header
        .split(',')
        .map(str::trim)
        .zip(last.split(',').map(str::trim))
        .collect();

    let scenario_id = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut row = vec![scenario_id];
    row.extend(
        rollup_header()
            .iter()
            .skip(1)
            .map(|name| cells.get(name).copied().unwrap_or_default().to_string()),
    );
    Ok(Some(row))
}

/// Write the rollup of every summary in `dir` to `output`.
pub fn write_rollup(dir: &Path, output: &Path) -> Result<RollupReport> {
    let skip = output.canonicalize().ok();
    let mut inputs: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "csv"))
        .filter(|p| skip.is_none() || p.canonicalize().ok() != skip)
        .collect();
    inputs.sort();

    let mut report = RollupReport::default();
    let mut text = rollup_header().join(",");
    text.push('\n');
    for path in inputs {
        match summary_row(&path)? {
            Some(row) => {
                text.push_str(&row.join(","));
                text.push('\n');
                report.rows += 1;
                debug!("{} processed", path.display());
            }
            None => {
                warn!("{} has no summary row, skipping", path.display());
                report.skipped.push(path);
            }
        }
    }

    fs::write(output, text)?;
    info!("{} created", output.display());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::detail_header;
    use tempfile::TempDir;

    fn detail_file(dir: &Path, name: &str, summary: &[&str]) {
        let mut text = detail_header().join(",");
        text.push('\n');
        text.push_str(&vec!["1"; 27].join(","));
        text.push('\n');
        text.push_str(&summary.join(","));
        text.push('\n');
        fs::write(dir.join(name), text).unwrap();
    }

    fn passing_summary() -> Vec<&'static str> {
        let mut cells = vec!["", "", "", "", "10.0", "2.5", "Passed!"];
        cells.extend(["12.5"; 5]);
        cells.push("");
        cells.extend(["7.0"; 5]);
        cells.extend(["900.0", "3.0", "1200.0", "5000.0", "-41.0"]);
        cells.extend(["40.0", "70.0", "-92.0", "3.0"]);
        cells
    }

    #[test]
    fn test_header_columns() {
        let header = rollup_header();
        assert_eq!(header.len(), 23);
        assert_eq!(header[0], "scenario_id");
        assert_eq!(header[3], "test result");
        assert!(!header.contains(&"channel"));
    }

    #[test]
    fn test_rollup_maps_by_name() {
        let tmp = TempDir::new().unwrap();
        detail_file(tmp.path(), "TP2_x_2.4GHz.csv", &passing_summary());
        detail_file(tmp.path(), "TP1_x_2.4GHz.csv", &["N/A"; 27]);
        let out = tmp.path().join("summary.csv");

        let report = write_rollup(tmp.path(), &out).unwrap();

        assert_eq!(report.rows, 2);
        let text = fs::read_to_string(&out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("TP1_x_2.4GHz,N/A,N/A,N/A,"));
        assert!(lines[2].starts_with("TP2_x_2.4GHz,10.0,2.5,Passed!,12.5,"));
        assert_eq!(lines[2].split(',').count(), 23);
        assert!(lines[2].ends_with(",40.0,70.0,-92.0,3.0"));
    }

    #[test]
    fn test_rollup_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        detail_file(tmp.path(), "TP1_a_2.4GHz.csv", &passing_summary());
        detail_file(tmp.path(), "TP1_a_5GHz.csv", &["N/A"; 27]);
        let out = tmp.path().join("summary.csv");

        write_rollup(tmp.path(), &out).unwrap();
        let first = fs::read(&out).unwrap();
        // the existing output must not be picked up as an input
        let report = write_rollup(tmp.path(), &out).unwrap();
        let second = fs::read(&out).unwrap();

        assert_eq!(report.rows, 2);
        assert_eq!(first, second);
    }

    #[test]
    fn test_header_only_file_is_skipped() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("empty.csv"), "a,b,c\n").unwrap();
        fs::create_dir(tmp.path().join("raw")).unwrap();
        let out = tmp.path().join("out").with_extension("txt");

        let report = write_rollup(tmp.path(), &out).unwrap();
        assert_eq!(report.rows, 0);
        assert_eq!(report.skipped.len(), 1);
    }
}
