//! Executor configuration.
//!
//! The executor reads one YAML file describing the two test sites (DUT and
//! interferer), the collection parameters passed to every scenario, and the
//! fixed waits used while driving traffic.
//!
//! ```yaml
//! dut:
//!   lan:  { name: dut-lan,  mng_ip: 10.0.0.10, ip: 192.168.10.10, user: qoe, password: qoe }
//!   wlan: { name: dut-wlan, mng_ip: 10.0.0.11, ip: 192.168.1.20,  user: qoe, password: qoe }
//!   serial_port: /dev/ttyUSB0
//!   ssid: dut-ssid
//!   wlan_password: secret
//! interferer: { ... }
//! collection:
//!   duration: 20m
//!   period: 30s
//!   tolerance: 10.0
//!   url: https://192.168.1.1:8443
//! traffic:
//!   iperf_path: /usr/bin/iperf3
//!   iperf_results_dir: /tmp/qoe
//! ```

use crate::error::{QoeError, Result};
use crate::remote::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default scoring/monitoring API base URL.
pub const DEFAULT_API_URL: &str = "https://192.168.1.1:8443";

/// Default management API base URL (framework version lookup).
pub const DEFAULT_MANAGEMENT_URL: &str = "http://192.168.1.1:8443";

/// One SSH-reachable traffic host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Human-readable name used in logs
    pub name: String,
    /// Management address used for SSH
    pub mng_ip: String,
    /// Data-plane address traffic is sent to
    pub ip: String,
    /// SSH user
    pub user: String,
    /// SSH password
    pub password: String,
    /// SSH port
    #[serde(default = "default_ssh_port")]
    pub port: u16,
}

fn default_ssh_port() -> u16 {
    22
}

/// One side of the test bed: a router with a LAN host and a wireless station.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Wired host behind the router; runs the traffic client
    pub lan: HostConfig,
    /// Wireless station associated to the router; runs the traffic server
    pub wlan: HostConfig,
    /// Serial console device of the router
    pub serial_port: String,
    /// SSID the wireless station must be associated to
    pub ssid: String,
    /// Passphrase for `ssid`
    pub wlan_password: String,
}

/// Parameters handed to every collection run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionSettings {
    /// Total collection time per scenario
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Time between two telemetry samples
    #[serde(with = "humantime_serde")]
    pub period: Duration,
    /// Accepted |delta| in percentage points
    pub tolerance: f64,
    /// Scoring/monitoring API base URL
    pub url: String,
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(20 * 60),
            period: Duration::from_secs(30),
            tolerance: 10.0,
            url: DEFAULT_API_URL.to_string(),
        }
    }
}

/// Traffic generator locations on the remote hosts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficSettings {
    /// iperf3 binary on every host
    pub iperf_path: String,
    /// Directory on the LAN hosts where client logs are written
    pub iperf_results_dir: String,
}

impl Default for TrafficSettings {
    fn default() -> Self {
        Self {
            iperf_path: "/usr/bin/iperf3".to_string(),
            iperf_results_dir: "/tmp/qoe".to_string(),
        }
    }
}

/// Periodic router maintenance over the serial console.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceSettings {
    /// Power-cycle both routers after every N scenarios (0 disables)
    pub reboot_every: usize,
    /// Wait after issuing the reboot
    #[serde(with = "humantime_serde")]
    pub settle: Duration,
    /// Serial console baud rate
    pub baud_rate: u32,
    /// Wait after each console command before draining the response
    #[serde(with = "humantime_serde")]
    pub serial_settle: Duration,
}

impl Default for MaintenanceSettings {
    fn default() -> Self {
        Self {
            reboot_every: 5,
            settle: Duration::from_secs(360),
            baud_rate: 115_200,
            serial_settle: Duration::from_secs(1),
        }
    }
}

/// Fixed waits around traffic control.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    /// Wait before starting telemetry collection
    #[serde(with = "humantime_serde")]
    pub pre_collection_delay: Duration,
    /// Wait after stopping a traffic generator
    #[serde(with = "humantime_serde")]
    pub after_stop: Duration,
    /// Wait after forcing a wireless reconnect
    #[serde(with = "humantime_serde")]
    pub after_reconnect: Duration,
    /// Ramp-up wait after starting a traffic client
    #[serde(with = "humantime_serde")]
    pub after_client_start: Duration,
    /// Wait between the end of collection and traffic teardown
    #[serde(with = "humantime_serde")]
    pub before_teardown: Duration,
    /// Check the associated SSID after reconnecting and force it if wrong
    pub verify_association: bool,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            pre_collection_delay: Duration::ZERO,
            after_stop: Duration::from_secs(3),
            after_reconnect: Duration::from_secs(10),
            after_client_start: Duration::from_secs(5),
            before_teardown: Duration::from_secs(3),
            verify_association: true,
        }
    }
}

/// Complete executor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Device under test
    pub dut: SiteConfig,
    /// Interfering access point
    pub interferer: SiteConfig,
    #[serde(default)]
    pub collection: CollectionSettings,
    #[serde(default)]
    pub traffic: TrafficSettings,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub maintenance: MaintenanceSettings,
    #[serde(default)]
    pub timing: TimingSettings,
    /// Management API base URL used to name the work directory
    #[serde(default = "default_management_url")]
    pub management_url: String,
    /// Path of the `qoe-collect` binary (defaults to the executor's sibling)
    #[serde(default)]
    pub collector_bin: Option<PathBuf>,
}

fn default_management_url() -> String {
    DEFAULT_MANAGEMENT_URL.to_string()
}

impl ExecutorConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| QoeError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_yaml(&text)
    }

    /// Parse and validate configuration text.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges the rest of the harness relies on.
    pub fn validate(&self) -> Result<()> {
        let c = &self.collection;
        if !(0.0..=100.0).contains(&c.tolerance) {
            return Err(QoeError::Config(format!(
                "tolerance {} outside [0, 100]",
                c.tolerance
            )));
        }
        if c.period.is_zero() {
            return Err(QoeError::Config("period must be positive".to_string()));
        }
        if c.duration.is_zero() {
            return Err(QoeError::Config("duration must be positive".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(QoeError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
