//! Telemetry capture from the scoring/monitoring API.
//!
//! - [`category`]: the five endpoint categories, their schemas and extraction rules
//! - [`client`]: HTTP fetching that degrades every failure to an empty payload
//! - [`recorder`]: one append-only CSV series per (category, band)

pub mod category;
pub mod client;
pub mod recorder;

pub use category::{NA, TelemetryCategory};
pub use client::{HttpTelemetryClient, TelemetryFetcher, work_dir_name};
pub use recorder::{TelemetryRecorder, series_path};
