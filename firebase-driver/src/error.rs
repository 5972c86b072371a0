//! Error types for the Firebase driver

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for driver operations
pub type Result<T> = std::result::Result<T, DriverError>;

/// Error reported by the backend client through a completion or cancel callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendError {
    /// Backend error code, e.g. `PERMISSION_DENIED`
    pub code: String,
    /// Human readable message
    pub message: String,
}

impl BackendError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for BackendError {}

/// Firebase driver error types
///
/// Errors are `Clone` because they travel through multicast streams.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    /// A call received an argument it cannot work with
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A request named a method the dispatcher does not know
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    /// Invalid backend URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Backend reported a failure
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for DriverError {
    fn from(err: serde_json::Error) -> Self {
        DriverError::Serialization(err.to_string())
    }
}
