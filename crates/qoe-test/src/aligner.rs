//! Lockstep replay of the four capture series used for aggregation.
//!
//! Alignment is positional: the n-th line of every series belongs to tick n.
//! The first gap in any series (end of file, blank line, short row) ends the
//! whole replay; later ticks are not summarized even if other series have them.

use crate::error::{QoeError, Result};
use crate::telemetry::{TelemetryCategory, series_path};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;
use tracing::{debug, warn};

/// Categories joined per tick, in detail-row order.
pub const ALIGNED_CATEGORIES: [TelemetryCategory; 4] = [
    TelemetryCategory::LinkScoring,
    TelemetryCategory::AirScoring,
    TelemetryCategory::LinkMonitoring,
    TelemetryCategory::AirMonitoring,
];

/// One read from a capture series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeriesRecord {
    Row(Vec<String>),
    End,
    Malformed(String),
}

/// Sequential reader over one capture file, header skipped.
pub struct SeriesReader {
    category: TelemetryCategory,
    lines: Lines<BufReader<File>>,
}

impl SeriesReader {
    /// Open the series for `category` at `path`.
    pub fn open(category: TelemetryCategory, path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| QoeError::MissingSeries {
            path: path.to_path_buf(),
            source,
        })?;
        let mut lines = BufReader::new(file).lines();
        // header
        let _ = lines.next();
        Ok(Self { category, lines })
    }

    /// Next data row.
    pub fn next_record(&mut self) -> SeriesRecord {
        let line = match self.lines.next() {
            None => return SeriesRecord::End,
            Some(Err(e)) => return SeriesRecord::Malformed(e.to_string()),
            Some(Ok(line)) => line,
        };
        if line.trim().is_empty() {
            return SeriesRecord::Malformed("empty line".to_string());
        }

        let cells: Vec<String> = line.split(',').map(|c| c.trim().to_string()).collect();
        if cells.len() < self.category.width() {
            return SeriesRecord::Malformed(format!(
                "{} fields, expected {}",
                cells.len(),
                self.category.width()
            ));
        }
        SeriesRecord::Row(cells)
    }
}

/// One tick's rows from the four aggregated categories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignedSample {
    rows: [Vec<String>; 4],
}

impl AlignedSample {
    /// Build a sample from rows in [`ALIGNED_CATEGORIES`] order.
    pub fn new(rows: [Vec<String>; 4]) -> Self {
        Self { rows }
    }

    /// Raw cell of `field` in the `category` row.
    pub fn get(&self, category: TelemetryCategory, field: &str) -> Option<&str> {
        let slot = ALIGNED_CATEGORIES.iter().position(|c| *c == category)?;
        let index = category.field_index(field)?;
        self.rows[slot].get(index).map(String::as_str)
    }
}

/// Lockstep iterator over the four series of one band.
pub struct SampleAligner {
    band: String,
    readers: Vec<SeriesReader>,
    tick: usize,
    done: bool,
}

impl SampleAligner {
    /// Open the four series for `band` under `dir`.
    pub fn open(dir: &Path, band: &str) -> Result<Self> {
        let readers = ALIGNED_CATEGORIES
            .iter()
            .map(|c| SeriesReader::open(*c, &series_path(dir, *c, band)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            band: band.to_string(),
            readers,
            tick: 0,
            done: false,
        })
    }

    /// Ticks produced so far.
    pub fn ticks(&self) -> usize {
        self.tick
    }
}

impl Iterator for SampleAligner {
    type Item = AlignedSample;

    fn next(&mut self) -> Option<AlignedSample> {
        if self.done {
            return None;
        }

        let mut rows = Vec::with_capacity(ALIGNED_CATEGORIES.len());
        for (reader, category) in self.readers.iter_mut().zip(ALIGNED_CATEGORIES) {
            match reader.next_record() {
                SeriesRecord::Row(row) => rows.push(row),
                SeriesRecord::End => {
                    debug!(
                        "{} series for {} ended at tick {}",
                        category, self.band, self.tick
                    );
                    self.done = true;
                    return None;
                }
                SeriesRecord::Malformed(reason) => {
                    warn!(
                        "{} series for {} malformed at tick {}: {}",
                        category, self.band, self.tick, reason
                    );
                    self.done = true;
                    return None;
                }
            }
        }

        let rows: [Vec<String>; 4] = rows.try_into().ok()?;
        self.tick += 1;
        Some(AlignedSample::new(rows))
    }
}
