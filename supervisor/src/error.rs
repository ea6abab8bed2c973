//! Supervisor-specific error types

use shared::SharedError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Failed to spawn backend process: {message}")]
    SpawnFailed { message: String },

    #[error("Backend process exited during start-up: {status}")]
    BackendExited { status: shared::ProcessStatus },

    #[error("Backend did not become healthy at {url} within {timeout:?}")]
    HealthTimeout { url: String, timeout: Duration },

    #[error("Update operation not allowed: {reason}")]
    UpdateConfig { reason: String },

    #[error("Update {operation} already in progress")]
    UpdateBusy { operation: String },

    #[error("{message} (state: {state})")]
    UpdateUsage { message: String, state: String },

    #[error("Update client failed: {message}")]
    UpdateTransport { message: String },

    #[error("Another instance is already running (pid: {pid}, started: {started_at})")]
    AlreadyRunning { pid: u32, started_at: String },

    #[error("Another instance is already running (lock held, metadata unavailable)")]
    AlreadyRunningNoMeta,

    #[error("Desktop shell error: {message}")]
    ShellFailed { message: String },

    #[error("Configuration error: {field}")]
    ConfigurationError { field: String },

    #[error("Shared component error")]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl SupervisorError {
    pub fn spawn(message: impl Into<String>) -> Self {
        SupervisorError::SpawnFailed { message: message.into() }
    }

    pub fn config(field: impl Into<String>) -> Self {
        SupervisorError::ConfigurationError { field: field.into() }
    }

    pub fn update_config(reason: impl Into<String>) -> Self {
        SupervisorError::UpdateConfig { reason: reason.into() }
    }

    pub fn usage(message: impl Into<String>, state: &shared::UpdateState) -> Self {
        SupervisorError::UpdateUsage {
            message: message.into(),
            state: state.name().to_string(),
        }
    }

    pub fn busy(operation: impl Into<String>) -> Self {
        SupervisorError::UpdateBusy { operation: operation.into() }
    }

    pub fn shell(message: impl Into<String>) -> Self {
        SupervisorError::ShellFailed { message: message.into() }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        SupervisorError::UpdateTransport { message: message.into() }
    }

    /// Start-up failures that must end the application
    pub fn is_fatal_startup(&self) -> bool {
        matches!(
            self,
            SupervisorError::SpawnFailed { .. }
                | SupervisorError::BackendExited { .. }
                | SupervisorError::HealthTimeout { .. }
                | SupervisorError::ConfigurationError { .. }
        )
    }
}

impl From<reqwest::Error> for SupervisorError {
    fn from(error: reqwest::Error) -> Self {
        SupervisorError::transport(error.to_string())
    }
}

pub type SupervisorResult<T> = Result<T, SupervisorError>;
