//! HTTP health probe backed by reqwest

use async_trait::async_trait;
use std::time::Duration;

use crate::traits::{HealthClient, ProbeOutcome};

/// Real health client; one connection pool shared by every probe
#[derive(Clone, Default)]
pub struct RealHealthClient {
    client: reqwest::Client,
}

impl RealHealthClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HealthClient for RealHealthClient {
    async fn probe(&self, url: &str, timeout: Duration) -> ProbeOutcome {
        match self.client.get(url).timeout(timeout).send().await {
            Ok(response) if response.status().is_success() => ProbeOutcome::Healthy(response.status().as_u16()),
            Ok(response) => ProbeOutcome::Unhealthy(response.status().as_u16()),
            Err(e) => ProbeOutcome::Unreachable(e.to_string()),
        }
    }
}
