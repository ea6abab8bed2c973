//! Backend process lifecycle status

use serde::{Deserialize, Serialize};
use std::fmt;

/// Last-known status of the supervised backend process
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ProcessStatus {
    Running,
    /// Process exited on its own with an exit code
    Exited { code: i32 },
    /// Process was terminated by a signal (or the platform reported no code)
    Signaled { signal: Option<i32> },
}

impl ProcessStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, ProcessStatus::Running)
    }

    /// A non-null, non-zero exit code. Clean exits and signal
    /// terminations are not failures.
    pub fn is_failure(&self) -> bool {
        matches!(self, ProcessStatus::Exited { code } if *code != 0)
    }
}

impl From<std::process::ExitStatus> for ProcessStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ProcessStatus::Exited { code };
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            ProcessStatus::Signaled {
                signal: status.signal(),
            }
        }

        #[cfg(not(unix))]
        {
            ProcessStatus::Signaled { signal: None }
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessStatus::Running => write!(f, "running"),
            ProcessStatus::Exited { code } => write!(f, "exited with code {code}"),
            ProcessStatus::Signaled { signal: Some(signal) } => write!(f, "terminated by signal {signal}"),
            ProcessStatus::Signaled { signal: None } => write!(f, "terminated"),
        }
    }
}
