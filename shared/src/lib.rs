//! Shared types for the QBox desktop supervisor
//!
//! Contains the types that cross the boundary between the supervisor and the
//! UI layer (update state, IPC messages) together with the logging stack that
//! every component writes through.

pub mod errors;
pub mod log_writer;
pub mod logging;
pub mod messages;
pub mod types;

pub use errors::*;
pub use log_writer::{LogFileConfig, LogWriter};
pub use types::*;

// Re-export the IPC surface
pub use messages::{
    // UI ↔ Supervisor requests and replies
    IpcCall, IpcOutbound, IpcReply, IpcRequest, IpcResponse,

    // Backend process status
    ProcessStatus,
};
