//! WiFi QoE regression harness
//!
//! Drives a matrix of interference scenarios against a WiFi access point
//! (the DUT) and judges, per scenario, whether the access point's own
//! link-quality score tracks the bitrate loss actually measured on air.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                            BatchRunner                               │
//! │   interferer channel (serial) ─► scenario ─► reboot every N (serial) │
//! └──────────────────────────────┬───────────────────────────────────────┘
//!                                │
//!                      ScenarioOrchestrator
//!      stop ─► reconnect ─► servers ─► clients ─► collect ─► teardown
//!                 │ (ssh, RemoteExecutor)              │
//!                 ▼                                    ▼
//!        traffic stations                      qoe-collect process
//!                                 ┌────────────────────┴─────────────┐
//!                                 │  TelemetryRecorder  (poll loop)  │
//!                                 │  SampleAligner      (lockstep)   │
//!                                 │  MetricsAggregator  (verdicts)   │
//!                                 └──────────────────────────────────┘
//! ```
//!
//! # Binaries
//!
//! - `qoe-executor` runs a whole test matrix.
//! - `qoe-collect` polls the scoring API for one scenario and writes the
//!   per-band detail files.
//! - `qoe-summary` rolls the per-scenario summary rows into one table.

#![cfg_attr(not(test), warn(clippy::unwrap_used, clippy::expect_used))]

pub mod aggregate;
pub mod aligner;
pub mod batch;
pub mod collector;
pub mod config;
pub mod error;
pub mod logging;
pub mod matrix;
pub mod orchestrator;
pub mod remote;
pub mod rollup;
pub mod router;
pub mod serial;
pub mod telemetry;
pub mod traffic;
pub mod wait;

pub use aggregate::{BandSummary, MetricsAggregator, ScenarioParams, Verdict};
pub use aligner::{AlignedSample, SampleAligner};
pub use batch::{BatchReport, BatchRunner};
pub use collector::{CollectArgs, CollectionReport, Collector};
pub use config::ExecutorConfig;
pub use error::{QoeError, Result};
pub use matrix::{ScenarioDefinition, load_matrix};
pub use orchestrator::{CollectionLauncher, ScenarioOrchestrator, SubprocessCollector};
pub use remote::{RemoteExecutor, RetryPolicy, SshConnector};
pub use rollup::write_rollup;
pub use serial::SerialConsoleDriver;
pub use telemetry::{HttpTelemetryClient, TelemetryCategory, TelemetryFetcher};
