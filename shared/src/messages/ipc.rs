//! UI ↔ Supervisor IPC messages
//!
//! The UI sends one `IpcCall` per line; the supervisor answers each call with
//! an `IpcOutbound::Reply` and pushes `IpcOutbound::Event` lines whenever the
//! update state changes.

use serde::{Deserialize, Serialize};

use crate::errors::{SharedError, SharedResult};
use crate::types::{UpdateEvent, UpdateInfo, UpdateState};

/// Requests the UI layer can make
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "method")]
pub enum IpcRequest {
    #[serde(rename = "reportIssue")]
    ReportIssue,
    #[serde(rename = "openLogsFolder")]
    OpenLogsFolder,
    #[serde(rename = "updates.check")]
    CheckForUpdates,
    /// "Check for Updates…" menu item
    #[serde(rename = "menu.checkForUpdates")]
    MenuCheckForUpdates,
    #[serde(rename = "updates.download")]
    DownloadUpdate,
    #[serde(rename = "updates.install")]
    InstallUpdate,
    #[serde(rename = "updates.dismiss")]
    DismissUpdate,
    #[serde(rename = "updates.getState")]
    GetUpdateState,
}

/// A request tagged with the caller's correlation id
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct IpcCall {
    pub id: u64,
    #[serde(flatten)]
    pub request: IpcRequest,
}

impl IpcCall {
    pub fn parse(line: &str) -> SharedResult<Self> {
        serde_json::from_str(line.trim()).map_err(|e| SharedError::DeserializationError {
            message: format!("invalid IPC call: {e}"),
        })
    }
}

/// Result of an IPC request
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum IpcResponse {
    Ok,
    /// Result of `updates.check`: the newer release, if any
    Update { info: Option<UpdateInfo> },
    /// Result of `updates.getState`
    State { state: UpdateState },
    Error { message: String },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct IpcReply {
    pub id: u64,
    pub result: IpcResponse,
}

/// Everything the supervisor writes back to the UI layer
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IpcOutbound {
    Reply(IpcReply),
    Event(UpdateEvent),
}

impl IpcOutbound {
    pub fn to_json_line(&self) -> SharedResult<String> {
        serde_json::to_string(self).map_err(|e| SharedError::SerializationError {
            message: format!("failed to encode IPC message: {e}"),
        })
    }
}
