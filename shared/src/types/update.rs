//! Self-update state published to the UI layer

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Metadata about a release newer than the running application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInfo {
    pub version: String,
    pub release_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_notes: Option<String>,
}

/// Download progress for an update artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub total: u64,
    pub transferred: u64,
    pub percent: f64,
    pub bytes_per_second: u64,
}

impl Progress {
    /// Build a progress sample from byte counts and the time spent so far.
    /// An unknown total (0) reports 0 percent.
    pub fn from_transfer(transferred: u64, total: u64, elapsed: Duration) -> Self {
        let percent = if total == 0 {
            0.0
        } else {
            (transferred as f64 / total as f64 * 100.0).min(100.0)
        };
        let secs = elapsed.as_secs_f64();
        let bytes_per_second = if secs > 0.0 {
            (transferred as f64 / secs) as u64
        } else {
            0
        };

        Self {
            total,
            transferred,
            percent,
            bytes_per_second,
        }
    }
}

/// Update lifecycle state; exactly one per controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "status", content = "data", rename_all = "camelCase")]
pub enum UpdateState {
    #[default]
    Idle,
    Checking,
    Available(UpdateInfo),
    Downloading(Progress),
    Downloaded(UpdateInfo),
    Error(String),
}

impl UpdateState {
    pub fn is_idle(&self) -> bool {
        matches!(self, UpdateState::Idle)
    }

    /// Short lowercase name used in logs and usage errors
    pub fn name(&self) -> &'static str {
        match self {
            UpdateState::Idle => "idle",
            UpdateState::Checking => "checking",
            UpdateState::Available(_) => "available",
            UpdateState::Downloading(_) => "downloading",
            UpdateState::Downloaded(_) => "downloaded",
            UpdateState::Error(_) => "error",
        }
    }
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One-way update notification pushed to UI subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum UpdateEvent {
    #[serde(rename = "updates.checking")]
    Checking,
    #[serde(rename = "updates.available")]
    Available(UpdateInfo),
    #[serde(rename = "updates.notAvailable")]
    NotAvailable,
    #[serde(rename = "updates.progress")]
    Progress(Progress),
    #[serde(rename = "updates.downloaded")]
    Downloaded(UpdateInfo),
    #[serde(rename = "updates.error")]
    Error(String),
    #[serde(rename = "updates.manualCheckRequested")]
    ManualCheckRequested,
    #[serde(rename = "updates.dismissed")]
    Dismissed,
}
