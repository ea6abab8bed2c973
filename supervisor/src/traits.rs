//! Trait definitions with mockall annotations for testing
//!
//! Every collaborator that touches the outside world (child processes, HTTP,
//! the update feed, the desktop shell) sits behind one of these traits so the
//! supervisor logic can be driven by mocks in tests.

use std::path::{Path, PathBuf};
use std::time::Duration;

use shared::{Progress, UpdateInfo};
use tokio::sync::mpsc;

use crate::config::BackendConfig;
use crate::error::SupervisorResult;
use crate::services::process_manager::ManagedProcess;

/// Outcome of a single HTTP health probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// 2xx response
    Healthy(u16),
    /// Any other status code
    Unhealthy(u16),
    /// Connection refused, timeout, DNS failure, ...
    Unreachable(String),
}

impl ProbeOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeOutcome::Healthy(_))
    }
}

/// Backend process lifecycle
#[mockall::automock]
#[async_trait::async_trait]
pub trait ProcessManager: Send + Sync {
    /// Spawn the backend with its output routed to the log writer
    ///
    /// # Returns
    /// A handle that reports the process status and accepts stop requests
    async fn start(&self, backend: &BackendConfig) -> SupervisorResult<ManagedProcess>;

    /// Terminate the backend; a no-op when it has already exited
    async fn stop(&self, process: &ManagedProcess) -> SupervisorResult<()>;
}

/// HTTP GET used by the readiness prober
#[mockall::automock]
#[async_trait::async_trait]
pub trait HealthClient: Send + Sync {
    /// Issue a GET to `url`; never fails, errors are folded into the outcome
    async fn probe(&self, url: &str, timeout: Duration) -> ProbeOutcome;
}

/// Remote update feed and installer
#[mockall::automock]
#[async_trait::async_trait]
pub trait UpdateClient: Send + Sync {
    /// Ask the feed for a release newer than `current_version`
    async fn check(&self, current_version: &semver::Version) -> SupervisorResult<Option<UpdateInfo>>;

    /// Download the artifact for `info`, sending a progress sample per chunk
    ///
    /// # Returns
    /// Path of the downloaded artifact
    async fn download(&self, info: &UpdateInfo, progress: mpsc::UnboundedSender<Progress>) -> SupervisorResult<PathBuf>;

    /// Launch the downloaded installer; the caller exits afterwards
    async fn install(&self, artifact: &Path) -> SupervisorResult<()>;
}

/// Operating-system shell integration
#[mockall::automock]
pub trait DesktopShell: Send + Sync {
    /// Open a URL in the default browser
    fn open_url(&self, url: &str) -> SupervisorResult<()>;

    /// Reveal a folder in the file manager
    fn open_path(&self, path: &Path) -> SupervisorResult<()>;

    /// Present a blocking error to the user before the application exits
    fn show_fatal_error(&self, title: &str, message: &str);
}
