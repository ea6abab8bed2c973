//! Service implementations
//!
//! This module contains real implementations of all service traits.
//! These are the production implementations that handle actual I/O operations.

pub mod desktop_shell;
pub mod health_client;
pub mod process_manager;
pub mod process_output_handler;
pub mod session_guard;
pub mod update_client;

#[cfg(test)]
mod tests;

// Re-export all service implementations
pub use desktop_shell::RealDesktopShell;
pub use health_client::RealHealthClient;
pub use process_manager::{ManagedProcess, RealProcessManager};
pub use session_guard::{wait_for_exit_signal, ExitReason, SessionGuard};
pub use update_client::RealUpdateClient;
