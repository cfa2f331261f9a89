//! Error types for the QoE harness.
//!
//! Only conditions that callers act on get a variant. Telemetry fetch failures
//! and metric conversion failures are not errors at this level: they degrade to
//! placeholder rows and `N/A` markers where they happen.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, QoeError>;

/// Errors surfaced by the harness library.
#[derive(Error, Debug)]
pub enum QoeError {
    /// TCP connection or SSH handshake to a host failed.
    #[error("failed to connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    /// The host rejected the configured credentials.
    #[error("authentication failed for {user}@{host}")]
    Auth { host: String, user: String },

    /// Channel or exec failure inside an established SSH session.
    #[error("ssh error on {host}: {source}")]
    Ssh {
        host: String,
        #[source]
        source: ssh2::Error,
    },

    /// Local file or process I/O.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration file missing, unreadable or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// A line of the test matrix could not be parsed.
    #[error("test matrix line {line}: {reason}")]
    Matrix { line: usize, reason: String },

    /// A required remote step still failed after the retry budget.
    #[error("'{command}' failed on {host} with exit status {exit_code}")]
    SetupFailed {
        host: String,
        command: String,
        exit_code: i32,
    },

    /// A telemetry capture file needed for aggregation could not be opened.
    #[error("telemetry series {path:?} unavailable: {source}")]
    MissingSeries {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The operation was interrupted by the user.
    #[error("cancelled")]
    Cancelled,
}

impl QoeError {
    /// Whether this error is a user interrupt rather than a failure.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<serde_yaml::Error> for QoeError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config(err.to_string())
    }
}
