//! Single-instance lock and exit signals
//!
//! The lock is an OS-level exclusive file lock (fs2) held for the lifetime of
//! the supervisor. A JSON sidecar records who holds it so a second instance
//! can say which process is already running.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use shared::{component_debug, component_info, component_warn, Component};

use crate::error::{SupervisorError, SupervisorResult};

/// Diagnostic metadata written next to the lock file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockMetadata {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub version: String,
}

impl LockMetadata {
    fn current() -> Self {
        Self {
            pid: std::process::id(),
            started_at: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Held single-instance lock; released on drop
#[derive(Debug)]
pub struct SessionGuard {
    _lock_file: File,
    lock_path: PathBuf,
    meta_path: PathBuf,
}

impl SessionGuard {
    /// Try to become the only running instance.
    ///
    /// Fails with `AlreadyRunning` (or `AlreadyRunningNoMeta` when the holder
    /// left no readable metadata) if another process holds the lock.
    pub fn acquire(lock_path: &Path) -> SupervisorResult<Self> {
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)?;

        match lock_file.try_lock_exclusive() {
            Ok(()) => {
                let guard = Self {
                    _lock_file: lock_file,
                    lock_path: lock_path.to_path_buf(),
                    meta_path: metadata_path(lock_path),
                };
                guard.write_metadata()?;
                component_debug!(Component::Session, "🔒 Acquired instance lock {}", lock_path.display());
                Ok(guard)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                Err(existing_holder(lock_path))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write_metadata(&self) -> SupervisorResult<()> {
        let json = serde_json::to_string_pretty(&LockMetadata::current())?;
        let mut file = File::create(&self.meta_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    pub fn meta_path(&self) -> &Path {
        &self.meta_path
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.meta_path) {
            if e.kind() != io::ErrorKind::NotFound {
                component_warn!(
                    Component::Session,
                    "Failed to remove lock metadata {}: {}",
                    self.meta_path.display(),
                    e
                );
            }
        }
        component_debug!(Component::Session, "🔓 Released instance lock {}", self.lock_path.display());
    }
}

fn metadata_path(lock_path: &Path) -> PathBuf {
    let file_name = lock_path.file_name().and_then(|n| n.to_str()).unwrap_or("lock");
    lock_path.with_file_name(format!("{file_name}.meta.json"))
}

fn existing_holder(lock_path: &Path) -> SupervisorError {
    fs::read_to_string(metadata_path(lock_path))
        .ok()
        .and_then(|contents| serde_json::from_str::<LockMetadata>(&contents).ok())
        .map(|meta| SupervisorError::AlreadyRunning {
            pid: meta.pid,
            started_at: meta.started_at.to_rfc3339(),
        })
        .unwrap_or(SupervisorError::AlreadyRunningNoMeta)
}

/// Why the application is exiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Ctrl+C / SIGINT
    Interrupt,
    /// SIGTERM from the OS or a session manager
    Terminate,
    /// The UI closed its side of the IPC channel
    UiClosed,
    /// An update installer was launched
    InstallUpdate,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ExitReason::Interrupt => "interrupted",
            ExitReason::Terminate => "terminated",
            ExitReason::UiClosed => "UI closed",
            ExitReason::InstallUpdate => "installing update",
        };
        write!(f, "{text}")
    }
}

/// Resolve on the first process-level quit signal
pub async fn wait_for_exit_signal() -> ExitReason {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                let reason = tokio::select! {
                    _ = tokio::signal::ctrl_c() => ExitReason::Interrupt,
                    _ = sigterm.recv() => ExitReason::Terminate,
                };
                component_info!(Component::Session, "🛑 Received quit signal ({})", reason);
                return reason;
            }
            Err(e) => component_warn!(Component::Session, "SIGTERM handler unavailable: {}", e),
        }
    }

    let _ = tokio::signal::ctrl_c().await;
    component_info!(Component::Session, "🛑 Received quit signal ({})", ExitReason::Interrupt);
    ExitReason::Interrupt
}
