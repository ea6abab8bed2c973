//! Two-phase readiness probing
//!
//! Phase 1 polls the liveness endpoint until it answers with a success status;
//! running out of time there is fatal. Phase 2 polls a real API route so the
//! UI does not load against a backend whose storage is still initializing;
//! running out of time there only logs a warning.

use std::time::Duration;
use tokio::time::{sleep, Instant};

use shared::{component_debug, component_info, component_warn, Component};

use crate::config::HealthCheckConfig;
use crate::error::{SupervisorError, SupervisorResult};
use crate::traits::HealthClient;

/// What happened while waiting for the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessReport {
    pub liveness_attempts: u32,
    pub readiness_attempts: u32,
    /// False when phase 2 timed out and start-up proceeded anyway
    pub api_ready: bool,
    pub elapsed: Duration,
}

pub struct ReadinessProber<H: HealthClient> {
    client: H,
    config: HealthCheckConfig,
}

impl<H: HealthClient> ReadinessProber<H> {
    pub fn new(client: H, config: HealthCheckConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &HealthCheckConfig {
        &self.config
    }

    /// Run both phases in order
    pub async fn wait_until_ready(&self) -> SupervisorResult<ReadinessReport> {
        let started = Instant::now();
        let liveness_attempts = self.wait_for_liveness().await?;
        let (readiness_attempts, api_ready) = self.wait_for_readiness().await;

        Ok(ReadinessReport {
            liveness_attempts,
            readiness_attempts,
            api_ready,
            elapsed: started.elapsed(),
        })
    }

    /// Phase 1. Returns the number of probes it took.
    pub async fn wait_for_liveness(&self) -> SupervisorResult<u32> {
        let url = self.config.liveness_url();
        let deadline = Instant::now() + self.config.liveness_timeout;
        let mut attempts = 0;

        loop {
            attempts += 1;
            let outcome = self.client.probe(&url, self.config.request_timeout).await;
            if outcome.is_healthy() {
                component_info!(Component::Prober, "💚 Backend alive after {} attempt(s)", attempts);
                return Ok(attempts);
            }
            component_debug!(Component::Prober, "Liveness attempt {} not ready: {:?}", attempts, outcome);

            let now = Instant::now();
            if now >= deadline {
                return Err(SupervisorError::HealthTimeout {
                    url,
                    timeout: self.config.liveness_timeout,
                });
            }
            sleep(self.config.poll_interval.min(deadline - now)).await;
        }
    }

    /// Phase 2. Returns the number of probes and whether the API answered.
    pub async fn wait_for_readiness(&self) -> (u32, bool) {
        let url = self.config.readiness_url();
        let deadline = Instant::now() + self.config.readiness_timeout;
        let mut attempts = 0;

        loop {
            attempts += 1;
            let outcome = self.client.probe(&url, self.config.request_timeout).await;
            if outcome.is_healthy() {
                component_info!(Component::Prober, "✅ Backend API ready after {} attempt(s)", attempts);
                return (attempts, true);
            }

            let now = Instant::now();
            if now >= deadline {
                component_warn!(
                    Component::Prober,
                    "Backend API not ready after {:?} ({} attempts, last: {:?}); continuing start-up",
                    self.config.readiness_timeout,
                    attempts,
                    outcome
                );
                return (attempts, false);
            }
            sleep(self.config.readiness_interval.min(deadline - now)).await;
        }
    }
}
