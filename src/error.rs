//! Error types for Metadraft
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for Metadraft operations
///
/// This enum encompasses the failures the draft store, the HTTP service,
/// configuration loading, and the client-side persistence helpers can report.
/// Callers that need to branch on a specific kind (for example the HTTP layer
/// mapping errors to status codes) use `anyhow::Error::downcast_ref`.
#[derive(Error, Debug)]
pub enum MetadraftError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage backend errors (I/O, database, serialization of records)
    #[error("Storage error: {0}")]
    Storage(String),

    /// The submitted payload is missing or is not a JSON object
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// No draft exists under the requested id
    #[error("Draft not found: {0}")]
    NotFound(String),

    /// The draft exists but belongs to a different session
    #[error("Draft {0} is owned by another session")]
    Ownership(String),

    /// A stored record could not be decoded
    #[error("Corrupt draft record: {0}")]
    CorruptRecord(String),

    /// The request carried no session credential
    #[error("Missing session credential")]
    Unauthenticated,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for Metadraft operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;

/// Returns the [`MetadraftError`] carried by `err`, if any.
///
/// # Examples
///
/// ```
/// use metadraft::error::{kind_of, MetadraftError};
///
/// let err: anyhow::Error = MetadraftError::NotFound("01H".into()).into();
/// assert!(matches!(kind_of(&err), Some(MetadraftError::NotFound(_))));
/// ```
pub fn kind_of(err: &anyhow::Error) -> Option<&MetadraftError> {
    err.downcast_ref::<MetadraftError>()
}
