//! Real process management service implementation
//!
//! Spawns the backend executable, streams its output into the log writer and
//! watches it from a monitor task that owns the `Child`. Callers interact with
//! the process only through the cloneable [`ManagedProcess`] handle.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};

use crate::config::BackendConfig;
use crate::error::{SupervisorError, SupervisorResult};
use crate::services::process_output_handler::{configure_child_stdio, spawn_output_consumers};
use crate::traits::ProcessManager;
use shared::{component_debug, component_error, component_info, component_warn, Component, LogWriter, ProcessStatus};

/// Time a backend gets to exit after SIGTERM before it is killed
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

/// Handle to a supervised backend process
#[derive(Debug, Clone)]
pub struct ManagedProcess {
    pid: Option<u32>,
    command: PathBuf,
    port: u16,
    status: watch::Receiver<ProcessStatus>,
    stop_tx: mpsc::Sender<()>,
}

/// Owning side of a [`ManagedProcess`]: publishes the exit status and
/// receives stop requests.
#[derive(Debug)]
pub struct ProcessMonitor {
    status_tx: watch::Sender<ProcessStatus>,
    stop_rx: mpsc::Receiver<()>,
}

impl ManagedProcess {
    /// Create a handle in the `Running` state together with its monitor
    pub fn channel(pid: Option<u32>, command: impl Into<PathBuf>, port: u16) -> (ManagedProcess, ProcessMonitor) {
        let (status_tx, status) = watch::channel(ProcessStatus::Running);
        let (stop_tx, stop_rx) = mpsc::channel(1);

        let process = ManagedProcess {
            pid,
            command: command.into(),
            port,
            status,
            stop_tx,
        };
        (process, ProcessMonitor { status_tx, stop_rx })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn command(&self) -> &Path {
        &self.command
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Last-known status
    pub fn status(&self) -> ProcessStatus {
        *self.status.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.status().is_running()
    }

    /// Resolve once the process is no longer running
    pub async fn wait_for_exit(&self) -> ProcessStatus {
        let mut status = self.status.clone();
        let result = status.wait_for(|s| !s.is_running()).await.map(|s| *s);
        match result {
            Ok(exited) => exited,
            // Monitor went away without reporting
            Err(_) => ProcessStatus::Signaled { signal: None },
        }
    }

    /// Ask the monitor to terminate the process. Returns false when a stop is
    /// already pending or the monitor is gone.
    pub fn request_stop(&self) -> bool {
        self.stop_tx.try_send(()).is_ok()
    }
}

impl ProcessMonitor {
    pub fn report_exit(&self, status: ProcessStatus) {
        self.status_tx.send_replace(status);
    }

    /// Wait for the next stop request; `None` once every handle is dropped
    pub async fn stop_requested(&mut self) -> Option<()> {
        self.stop_rx.recv().await
    }
}

/// Real process manager implementation
pub struct RealProcessManager {
    /// Destination for backend stdout/stderr lines
    log_writer: Option<LogWriter>,

    /// Grace period between SIGTERM and a forced kill
    stop_grace: Duration,
}

impl RealProcessManager {
    /// Create new process manager with default settings
    pub fn new() -> Self {
        Self {
            log_writer: None,
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }

    /// Route backend output into a log writer (fluent API)
    pub fn with_log_writer(mut self, log_writer: LogWriter) -> Self {
        self.log_writer = Some(log_writer);
        self
    }

    /// Configure the stop grace period (fluent API)
    pub fn with_stop_grace(mut self, stop_grace: Duration) -> Self {
        self.stop_grace = stop_grace;
        self
    }

    fn build_command(backend: &BackendConfig) -> Command {
        let mut cmd = Command::new(&backend.executable);
        cmd.args(&backend.args).env("PORT", backend.port.to_string());
        for (key, value) in &backend.extra_env {
            cmd.env(key, value);
        }
        cmd.kill_on_drop(true);
        configure_child_stdio(&mut cmd);
        cmd
    }
}

impl Default for RealProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessManager for RealProcessManager {
    async fn start(&self, backend: &BackendConfig) -> SupervisorResult<ManagedProcess> {
        if backend.executable.as_os_str().is_empty() {
            return Err(SupervisorError::spawn("backend executable path is not configured"));
        }

        let mut cmd = Self::build_command(backend);
        let mut child = cmd
            .spawn()
            .map_err(|e| SupervisorError::spawn(format!("{}: {e}", backend.executable.display())))?;

        let pid = child.id();
        spawn_output_consumers(&mut child, self.log_writer.clone());

        let (process, monitor) = ManagedProcess::channel(pid, backend.executable.clone(), backend.port);
        tokio::spawn(monitor_child(child, monitor, self.stop_grace));

        component_info!(
            Component::Backend,
            "🚀 Spawned backend {} (PID: {}) on port {}",
            backend.executable.display(),
            pid.map(|p| p.to_string()).unwrap_or_else(|| "unknown".to_string()),
            backend.port
        );
        Ok(process)
    }

    async fn stop(&self, process: &ManagedProcess) -> SupervisorResult<()> {
        if !process.is_running() {
            return Ok(());
        }

        process.request_stop();
        match tokio::time::timeout(self.stop_grace + Duration::from_secs(2), process.wait_for_exit()).await {
            Ok(status) => component_debug!(Component::Backend, "🛑 Stopped backend ({})", status),
            Err(_) => component_warn!(Component::Backend, "Backend did not report exit after stop request"),
        }
        Ok(())
    }
}

/// Own the child until it exits or a stop is requested, then publish its status
async fn monitor_child(mut child: Child, mut monitor: ProcessMonitor, stop_grace: Duration) {
    let mut stop_requested = false;
    let status = tokio::select! {
        result = child.wait() => exit_status(result),
        Some(()) = monitor.stop_requested() => {
            stop_requested = true;
            terminate(&mut child, stop_grace).await
        }
    };

    if stop_requested || !status.is_failure() {
        component_info!(Component::Backend, "Backend process {}", status);
    } else {
        component_error!(Component::Backend, "Backend process {}", status);
    }
    monitor.report_exit(status);
}

/// SIGTERM with a grace period on Unix, forced kill otherwise
async fn terminate(child: &mut Child, stop_grace: Duration) -> ProcessStatus {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok() {
            if let Ok(result) = tokio::time::timeout(stop_grace, child.wait()).await {
                return exit_status(result);
            }
            component_warn!(
                Component::Backend,
                "Backend ignored SIGTERM for {:?}, killing it",
                stop_grace
            );
        }
    }

    #[cfg(not(unix))]
    let _ = stop_grace;

    let _ = child.start_kill();
    exit_status(child.wait().await)
}

fn exit_status(result: std::io::Result<std::process::ExitStatus>) -> ProcessStatus {
    match result {
        Ok(status) => status.into(),
        Err(e) => {
            component_error!(Component::Backend, "Failed to wait for backend process: {}", e);
            ProcessStatus::Signaled { signal: None }
        }
    }
}
