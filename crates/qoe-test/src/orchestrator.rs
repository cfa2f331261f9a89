//! Scenario execution.
//!
//! One scenario runs through a fixed sequence of phases, each applied to both
//! sides of the test bed before moving on:
//!
//! 1. **TeardownPrevious**: stop leftover generators on the wireless stations
//! 2. **Reconnect**: force reassociation, optionally verify the SSID
//! 3. **StartServers**: start a receiver on each wireless station
//! 4. **StartClients**: start a sender on each LAN host whose rate is non-zero
//! 5. **Collect**: run telemetry collection for the configured duration
//! 6. **Teardown**: stop the senders on both LAN hosts
//!
//! A failure on one side during reconnect or server start does not stop the
//! other side from being prepared; the scenario fails once both have been
//! tried. A client that cannot be started is recorded in the outcome and the
//! scenario still collects. Collection failures are logged only. Teardown runs whatever happened
//! before it, including after an interrupt.

use crate::collector::CollectArgs;
use crate::config::{ExecutorConfig, HostConfig, SiteConfig};
use crate::error::{QoeError, Result};
use crate::matrix::ScenarioDefinition;
use crate::remote::RemoteExecutor;
use crate::traffic;
use crate::wait;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One end of the test bed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Dut,
    Interferer,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Dut => write!(f, "DUT"),
            Side::Interferer => write!(f, "interferer"),
        }
    }
}

/// Scenario phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    TeardownPrevious,
    Reconnect,
    StartServers,
    StartClients,
    Collect,
    Teardown,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::TeardownPrevious => "teardown-previous",
            Phase::Reconnect => "reconnect",
            Phase::StartServers => "start-servers",
            Phase::StartClients => "start-clients",
            Phase::Collect => "collect",
            Phase::Teardown => "teardown",
        };
        f.write_str(name)
    }
}

/// Runs telemetry collection for one scenario.
#[async_trait]
pub trait CollectionLauncher: Send + Sync {
    /// Run collection to completion. `Ok(false)` means it finished with an
    /// error status.
    async fn launch(&self, args: &CollectArgs) -> Result<bool>;
}

/// Runs the `qoe-collect` binary as a child process.
#[derive(Debug, Clone)]
pub struct SubprocessCollector {
    program: PathBuf,
}

impl SubprocessCollector {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// `qoe-collect` next to the running executable.
    pub fn beside_current_exe() -> Result<Self> {
        let exe = std::env::current_exe()?;
        Ok(Self::new(exe.with_file_name("qoe-collect")))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl CollectionLauncher for SubprocessCollector {
    async fn launch(&self, args: &CollectArgs) -> Result<bool> {
        let argv = traffic::collector_args(args);
        info!("{} {}", self.program.display(), argv.join(" "));
        let status = tokio::process::Command::new(&self.program)
            .args(&argv)
            .status()
            .await?;
        if !status.success() {
            warn!("collection finished with {}", status);
        }
        Ok(status.success())
    }
}

/// What a completed scenario did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioOutcome {
    pub scenario_id: String,
    /// Sides on which a traffic client was started
    pub clients: Vec<Side>,
    /// Sides whose traffic client could not be started
    pub failed_clients: Vec<Side>,
    /// Collection finished successfully
    pub collected: bool,
}

/// Drives one scenario on both sides of the test bed.
#[derive(Clone)]
pub struct ScenarioOrchestrator {
    exec: RemoteExecutor,
    config: Arc<ExecutorConfig>,
    launcher: Arc<dyn CollectionLauncher>,
    work_dir: PathBuf,
    cancel: CancellationToken,
}

impl ScenarioOrchestrator {
    /// Create an orchestrator writing results under `work_dir`.
    pub fn new(
        exec: RemoteExecutor,
        config: Arc<ExecutorConfig>,
        launcher: Arc<dyn CollectionLauncher>,
        work_dir: PathBuf,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            exec,
            config,
            launcher,
            work_dir,
            cancel,
        }
    }

    /// Local directory holding the scenario results.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Run `scenario` through every phase. Teardown always runs.
    pub async fn run(&self, scenario: &ScenarioDefinition) -> Result<ScenarioOutcome> {
        let scenario_id = scenario.scenario_id();
        info!("Running scenario {}", scenario_id);

        let result = self.drive(scenario, &scenario_id).await;
        if let Err(e) = &result {
            error!("scenario {} failed: {}", scenario_id, e);
        }
        self.teardown(&scenario_id).await;
        result
    }

    fn sites(&self) -> [(Side, &SiteConfig); 2] {
        [
            (Side::Dut, &self.config.dut),
            (Side::Interferer, &self.config.interferer),
        ]
    }

    async fn drive(
        &self,
        scenario: &ScenarioDefinition,
        scenario_id: &str,
    ) -> Result<ScenarioOutcome> {
        debug!("{}: {}", scenario_id, Phase::TeardownPrevious);
        for (_, site) in self.sites() {
            self.stop_traffic(&site.wlan).await?;
        }

        let mut failures = Vec::new();

        debug!("{}: {}", scenario_id, Phase::Reconnect);
        for (side, site) in self.sites() {
            if let Err(e) = self.reconnect(site).await {
                record_side_failure(&mut failures, side, Phase::Reconnect, e)?;
            }
        }

        debug!("{}: {}", scenario_id, Phase::StartServers);
        for (side, site) in self.sites() {
            let cmd = traffic::start_server(&self.config.traffic.iperf_path);
            if let Err(e) = self.exec.require(&site.wlan, &cmd).await {
                record_side_failure(&mut failures, side, Phase::StartServers, e)?;
            }
        }
        if let Some(first) = failures.into_iter().next() {
            return Err(first);
        }

        debug!("{}: {}", scenario_id, Phase::StartClients);
        let mut clients = Vec::new();
        let mut client_failures = Vec::new();
        let mut failed_clients = Vec::new();
        for (side, site) in self.sites() {
            let rate = match side {
                Side::Dut => scenario.dut_data_rate,
                Side::Interferer => scenario.interferer_data_rate,
            };
            if rate == 0 {
                info!("no {} traffic in {}", side, scenario_id);
                continue;
            }
            match self.start_client(side, site, rate, scenario_id).await {
                Ok(()) => clients.push(side),
                Err(e) => {
                    record_side_failure(&mut client_failures, side, Phase::StartClients, e)?;
                    failed_clients.push(side);
                }
            }
        }

        debug!("{}: {}", scenario_id, Phase::Collect);
        let collected = self.collect(scenario, scenario_id).await?;

        Ok(ScenarioOutcome {
            scenario_id: scenario_id.to_string(),
            clients,
            failed_clients,
            collected,
        })
    }

    /// Stop the generator on `host`; "nothing to stop" is not an error.
    async fn stop_traffic(&self, host: &HostConfig) -> Result<()> {
        match self.exec.execute(host, traffic::STOP_IPERF, false).await {
            Ok(out) if !out.success() => debug!("no iperf3 stopped on {}", host.mng_ip),
            Ok(_) => {}
            Err(e) => warn!("stopping iperf3 on {} failed: {}", host.mng_ip, e),
        }
        wait::pause(&self.cancel, self.config.timing.after_stop).await
    }

    async fn reconnect(&self, site: &SiteConfig) -> Result<()> {
        let out = self
            .exec
            .execute(&site.wlan, traffic::WIFI_RECONNECT, true)
            .await?;
        if !out.success() {
            warn!(
                "wifi reconnect on {} exited with {}",
                site.wlan.mng_ip, out.exit_code
            );
        }
        wait::pause(&self.cancel, self.config.timing.after_reconnect).await?;

        if self.config.timing.verify_association {
            self.ensure_association(site).await?;
        }
        Ok(())
    }

    async fn ensure_association(&self, site: &SiteConfig) -> Result<()> {
        let out = self.exec.require(&site.wlan, traffic::CURRENT_SSID).await?;
        let current = out.stdout.trim();
        if current == site.ssid {
            return Ok(());
        }

        info!(
            "{} associated to '{}', connecting to '{}'",
            site.wlan.mng_ip, current, site.ssid
        );
        let cmd = traffic::wifi_connect(&site.ssid, &site.wlan_password);
        self.exec.require(&site.wlan, &cmd).await?;
        Ok(())
    }

    async fn start_client(
        &self,
        side: Side,
        site: &SiteConfig,
        rate_kbps: u64,
        scenario_id: &str,
    ) -> Result<()> {
        let traffic_cfg = &self.config.traffic;
        let dir = format!(
            "{}/{}",
            traffic_cfg.iperf_results_dir.trim_end_matches('/'),
            self.work_dir_name()
        );
        self.exec.require(&site.lan, &traffic::ensure_dir(&dir)).await?;

        let suffix = match side {
            Side::Dut => traffic::DUT_CLIENT_LOG,
            Side::Interferer => traffic::INTERFERER_CLIENT_LOG,
        };
        let cmd = traffic::start_client(
            &traffic_cfg.iperf_path,
            &site.wlan.ip,
            self.config.collection.duration.as_secs(),
            rate_kbps,
            &format!("{dir}/{scenario_id}_{suffix}"),
        );
        self.exec.require(&site.lan, &cmd).await?;
        info!("{} client sending {}K to {}", side, rate_kbps, site.wlan.ip);

        wait::pause(&self.cancel, self.config.timing.after_client_start).await
    }

    async fn collect(&self, scenario: &ScenarioDefinition, scenario_id: &str) -> Result<bool> {
        let delay = self.config.timing.pre_collection_delay;
        if !delay.is_zero() {
            info!("waiting for {:?} before data collection...", delay);
        }
        wait::pause(&self.cancel, delay).await?;
        tokio::fs::create_dir_all(&self.work_dir).await?;

        let collection = &self.config.collection;
        let args = CollectArgs {
            dut_bitrate: scenario.dut_data_rate,
            external_ap_load: scenario.interferer_data_rate,
            external_ap_channel: scenario.interferer_channel,
            duration_secs: collection.duration.as_secs(),
            period_secs: collection.period.as_secs(),
            tolerance: collection.tolerance,
            url: collection.url.clone(),
            output: self.work_dir.join(scenario_id),
        };

        match self.launcher.launch(&args).await {
            Ok(true) => Ok(true),
            Ok(false) => {
                warn!("collection for {} reported failure", scenario_id);
                Ok(false)
            }
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                error!("collection for {} failed: {}", scenario_id, e);
                Ok(false)
            }
        }
    }

    async fn teardown(&self, scenario_id: &str) {
        debug!("{}: {}", scenario_id, Phase::Teardown);
        let before = self.config.timing.before_teardown;
        info!("iperf client will be stopped in {:?}...", before);
        let _ = wait::pause(&self.cancel, before).await;
        for (_, site) in self.sites() {
            let _ = self.stop_traffic(&site.lan).await;
        }
    }

    fn work_dir_name(&self) -> String {
        self.work_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Log a per-side failure and keep it, unless it is an interrupt.
fn record_side_failure(
    failures: &mut Vec<QoeError>,
    side: Side,
    phase: Phase,
    err: QoeError,
) -> Result<()> {
    if err.is_cancelled() {
        return Err(err);
    }
    error!("{} {} failed: {}", side, phase, err);
    failures.push(err);
    Ok(())
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::sync::Mutex;

    /// Records launches and reports a fixed outcome.
    pub(crate) struct RecordingLauncher {
        pub(crate) calls: Mutex<Vec<CollectArgs>>,
        pub(crate) succeed: bool,
    }

    impl RecordingLauncher {
        pub(crate) fn new(succeed: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                succeed,
            })
        }

        pub(crate) fn calls(&self) -> Vec<CollectArgs> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CollectionLauncher for RecordingLauncher {
        async fn launch(&self, args: &CollectArgs) -> Result<bool> {
            self.calls.lock().unwrap().push(args.clone());
            Ok(self.succeed)
        }
    }
}
