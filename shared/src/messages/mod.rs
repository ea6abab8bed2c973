//! Message types exchanged with the UI layer
//!
//! - `ipc`: UI ↔ Supervisor requests, replies and pushed events
//! - `process`: backend process lifecycle status

pub mod ipc;
pub mod process;

pub use ipc::{IpcCall, IpcOutbound, IpcReply, IpcRequest, IpcResponse};

pub use process::ProcessStatus;
