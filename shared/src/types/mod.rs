//! Core types used throughout the supervisor

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod update;

pub use update::{Progress, UpdateEvent, UpdateInfo, UpdateState};

/// Supervisor component a log line originates from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    /// Start-up/shutdown orchestration and IPC dispatch
    Supervisor,
    /// Spawned backend process and its output
    Backend,
    /// Liveness/readiness polling
    Prober,
    /// Self-update state machine
    Updater,
    /// Single-instance lock and exit handling
    Session,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Supervisor => write!(f, "supervisor"),
            Component::Backend => write!(f, "backend"),
            Component::Prober => write!(f, "prober"),
            Component::Updater => write!(f, "updater"),
            Component::Session => write!(f, "session"),
        }
    }
}
