//! Lifecycle supervisor for the QBox desktop application
//!
//! This library starts the embedded backend, gates the UI on a two-phase
//! readiness check, drives the self-update state machine and serves the UI's
//! IPC calls. Every collaborator that touches the outside world is injected
//! through a trait so the whole lifecycle can be tested with mocks.

pub mod config;
pub mod core;
pub mod error;
pub mod readiness;
pub mod services;
pub mod supervisor;
pub mod traits;
pub mod update_controller;

// Re-export commonly used types
pub use config::{Args, BackendConfig, HealthCheckConfig, SupervisorConfig, UpdateConfig, UpdateFeed};
pub use error::{SupervisorError, SupervisorResult};
pub use readiness::{ReadinessProber, ReadinessReport};
pub use supervisor::Supervisor;
pub use traits::{DesktopShell, HealthClient, ProbeOutcome, ProcessManager, UpdateClient};
pub use update_controller::UpdateController;
