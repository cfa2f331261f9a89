//! Per-(category, band) raw capture files.
//!
//! Line order is the tick index: every capture appends exactly one line to
//! every file of the category, real data or an `N/A` placeholder, so that all
//! series stay the same length as the polling clock.

use super::category::TelemetryCategory;
use crate::error::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Writes raw telemetry captures under one directory.
#[derive(Debug)]
pub struct TelemetryRecorder {
    dir: PathBuf,
    bands: HashMap<TelemetryCategory, Vec<String>>,
    placeholders: usize,
}

impl TelemetryRecorder {
    /// Recorder writing into `dir`, created if missing.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            bands: HashMap::new(),
            placeholders: 0,
        })
    }

    /// Capture directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Discover the bands of `category` from its first payload and write one
    /// header line per band, truncating earlier captures.
    pub fn bootstrap(&mut self, category: TelemetryCategory, payload: &Value) -> Result<()> {
        let bands = TelemetryCategory::discover_bands(payload);
        let header = category.header();
        for band in &bands {
            fs::write(self.series_path(category, band), format!("{header}\n"))?;
        }
        info!("{} bands: {}", category, bands.join(", "));
        self.bands.insert(category, bands);
        Ok(())
    }

    /// Append this tick's row for every band of `category`.
    ///
    /// Bands not seen at bootstrap are ignored; bands missing from the payload
    /// get a placeholder row.
    pub fn capture_tick(&mut self, category: TelemetryCategory, payload: &Value) -> Result<()> {
        let Some(bands) = self.bands.get(&category) else {
            return Ok(());
        };

        let mut placeholders = 0;
        for band in bands {
            let row = match category.extract(payload, band) {
                Some(cells) => cells.join(","),
                None => {
                    debug!("no {} record for {}, writing placeholder", category, band);
                    placeholders += 1;
                    category.placeholder()
                }
            };
            let mut file = OpenOptions::new()
                .append(true)
                .create(true)
                .open(self.series_path(category, band))?;
            writeln!(file, "{row}")?;
        }
        self.placeholders += placeholders;
        Ok(())
    }

    /// Bands fixed at bootstrap for `category`.
    pub fn bands(&self, category: TelemetryCategory) -> &[String] {
        self.bands.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of placeholder rows written so far.
    pub fn placeholder_rows(&self) -> usize {
        self.placeholders
    }

    /// File holding the `category` series for `band`.
    pub fn series_path(&self, category: TelemetryCategory, band: &str) -> PathBuf {
        series_path(&self.dir, category, band)
    }
}

/// File holding the `category` series for `band` under `dir`.
pub fn series_path(dir: &Path, category: TelemetryCategory, band: &str) -> PathBuf {
    dir.join(category.file_name(band))
}
