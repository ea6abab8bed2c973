//! Shared error types for the desktop supervisor

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Log I/O failed while {operation} {path}: {source}")]
    LogIo {
        operation: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization failed: {message}")]
    SerializationError { message: String },

    #[error("Deserialization failed: {message}")]
    DeserializationError { message: String },

    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfig { field: String, value: String },
}

impl SharedError {
    pub fn log_io(operation: &'static str, path: &std::path::Path, source: std::io::Error) -> Self {
        SharedError::LogIo {
            operation,
            path: path.display().to_string(),
            source,
        }
    }
}

pub type SharedResult<T> = Result<T, SharedError>;
