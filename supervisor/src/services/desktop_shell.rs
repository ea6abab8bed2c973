//! Operating-system shell integration
//!
//! Opens URLs and folders with the platform handler. Fatal errors go to stderr
//! and the log; the UI process renders its own dialog from the exit code.

use std::ffi::OsStr;
use std::path::Path;

use shared::{component_debug, component_error, Component};

use crate::error::{SupervisorError, SupervisorResult};
use crate::traits::DesktopShell;

/// Hands a URL or path to the platform handler
pub type OpenFn = fn(&OsStr) -> Result<(), opener::OpenError>;

#[derive(Debug, Clone)]
pub struct RealDesktopShell {
    open: OpenFn,
}

impl RealDesktopShell {
    pub fn new() -> Self {
        Self { open: system_open }
    }

    /// Replace the platform handler (fluent API)
    pub fn with_opener(mut self, open: OpenFn) -> Self {
        self.open = open;
        self
    }

    fn open(&self, target: &OsStr) -> SupervisorResult<()> {
        (self.open)(target).map_err(|e| SupervisorError::shell(format!("failed to open {}: {e}", target.to_string_lossy())))
    }
}

impl Default for RealDesktopShell {
    fn default() -> Self {
        Self::new()
    }
}

impl DesktopShell for RealDesktopShell {
    fn open_url(&self, url: &str) -> SupervisorResult<()> {
        component_debug!(Component::Session, "Opening {}", url);
        self.open(OsStr::new(url))
    }

    fn open_path(&self, path: &Path) -> SupervisorResult<()> {
        std::fs::create_dir_all(path)?;
        component_debug!(Component::Session, "Revealing {}", path.display());
        self.open(path.as_os_str())
    }

    fn show_fatal_error(&self, title: &str, message: &str) {
        component_error!(Component::Session, "{}: {}", title, message);
        eprintln!("\n{title}\n\n{message}\n");
    }
}

fn system_open(target: &OsStr) -> Result<(), opener::OpenError> {
    opener::open(target)
}
