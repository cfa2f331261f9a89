//! Test-matrix execution with periodic router maintenance.

use crate::config::ExecutorConfig;
use crate::matrix::ScenarioDefinition;
use crate::orchestrator::{ScenarioOrchestrator, ScenarioOutcome};
use crate::remote::RemoteExecutor;
use crate::router;
use crate::serial::SerialConsoleDriver;
use crate::traffic;
use crate::wait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Outcome of a batch.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub completed: Vec<ScenarioOutcome>,
    /// Scenario id and error message of every failed scenario
    pub failed: Vec<(String, String)>,
    /// Router reboots performed
    pub reboots: usize,
    pub interrupted: bool,
}

/// Runs scenarios one at a time.
pub struct BatchRunner {
    orchestrator: ScenarioOrchestrator,
    serial: SerialConsoleDriver,
    exec: RemoteExecutor,
    config: Arc<ExecutorConfig>,
    cancel: CancellationToken,
}

impl BatchRunner {
    pub fn new(
        orchestrator: ScenarioOrchestrator,
        serial: SerialConsoleDriver,
        exec: RemoteExecutor,
        config: Arc<ExecutorConfig>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            orchestrator,
            serial,
            exec,
            config,
            cancel,
        }
    }

    /// Run every scenario in order.
    ///
    /// A failing scenario is logged and skipped. Every `reboot_every`
    /// scenarios both routers are rebooted. Whatever happens, the traffic
    /// servers on both wireless stations are stopped before returning.
    pub async fn run(&self, scenarios: &[ScenarioDefinition]) -> BatchReport {
        let mut report = BatchReport::default();

        for (index, scenario) in scenarios.iter().enumerate() {
            if self.cancel.is_cancelled() {
                report.interrupted = true;
                break;
            }
            info!(
                "scenario {}/{}: {}",
                index + 1,
                scenarios.len(),
                scenario.scenario_id()
            );

            self.set_interferer_channel(scenario.interferer_channel)
                .await;
            match self.orchestrator.run(scenario).await {
                Ok(outcome) => report.completed.push(outcome),
                Err(e) if e.is_cancelled() => {
                    report.interrupted = true;
                    break;
                }
                Err(e) => report.failed.push((scenario.scenario_id(), e.to_string())),
            }

            let every = self.config.maintenance.reboot_every;
            if every > 0 && (index + 1) % every == 0 {
                if self.reboot_routers().await.is_err() {
                    report.interrupted = true;
                    break;
                }
                report.reboots += 1;
            }
        }

        self.final_teardown().await;
        report
    }

    async fn set_interferer_channel(&self, channel: u32) {
        let site = &self.config.interferer;
        info!("setting interferer 2.4GHz channel to {}", channel);
        let transcript = self
            .serial
            .send_async(
                &site.serial_port,
                self.config.maintenance.baud_rate,
                router::set_channel_script(channel),
            )
            .await;
        debug!("{}", transcript);
    }

    async fn reboot_routers(&self) -> crate::error::Result<()> {
        let baud = self.config.maintenance.baud_rate;
        for site in [&self.config.dut, &self.config.interferer] {
            info!("rebooting router on {}", site.serial_port);
            let transcript = self
                .serial
                .send_async(&site.serial_port, baud, router::reboot_script())
                .await;
            debug!("{}", transcript);
        }
        let settle = self.config.maintenance.settle;
        info!("waiting {:?} for routers to come back", settle);
        wait::pause(&self.cancel, settle).await
    }

    async fn final_teardown(&self) {
        for site in [&self.config.dut, &self.config.interferer] {
            if let Err(e) = self.exec.execute(&site.wlan, traffic::STOP_IPERF, false).await {
                warn!("final stop on {} failed: {}", site.wlan.mng_ip, e);
            }
        }
        if self.cancel.is_cancelled() {
            error!("batch interrupted");
        }
    }
}
