use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type for schema file loading and parsing
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Errors raised before any reconciliation starts
#[derive(Error, Debug)]
pub enum SchemaError {
    /// Schema file does not exist
    #[error("Schema file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Schema file exists but could not be read
    #[error("Failed to read schema file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Schema file is not valid JSON
    #[error("Invalid JSON in schema file: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Top-level JSON value is not an object
    #[error("Schema file must contain a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// One or more attribute declarations failed validation
    #[error("Invalid schema:\n  {}", .0.join("\n  "))]
    Invalid(Vec<String>),
}

impl SchemaError {
    /// Validation messages, if this is a validation failure
    pub fn validation_errors(&self) -> &[String] {
        match self {
            Self::Invalid(errors) => errors,
            _ => &[],
        }
    }
}

/// Failure reported by a [`crate::NamespaceStore`] call.
///
/// "Namespace does not exist" is not an error: stores report it as `Ok(None)`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The service answered with a non-success status
    #[error("{operation} failed for '{namespace}' (HTTP {status}): {message}")]
    Rejected {
        operation: &'static str,
        namespace: String,
        status: u16,
        message: String,
    },

    /// The request never produced a response (DNS, TLS, connection reset, ...)
    #[error("{operation} failed for '{namespace}': {message}")]
    Transport {
        operation: &'static str,
        namespace: String,
        message: String,
    },

    /// The call did not finish within the configured bound
    #[error("{operation} for '{namespace}' timed out after {}s", after.as_secs())]
    Timeout {
        operation: &'static str,
        namespace: String,
        after: Duration,
    },

    #[error("{0}")]
    Other(String),
}

impl StoreError {
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}
