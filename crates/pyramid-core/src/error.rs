//! Error types for the cluster pyramid

use thiserror::Error;

/// Result type alias for pyramid operations
pub type Result<T> = std::result::Result<T, Error>;

/// Cluster pyramid errors
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed clustering parameter, field spec or partition description
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// No partition leaf contains the point
    #[error("Point ({x}, {y}) is outside every partition")]
    PointOutOfRange { x: f64, y: f64 },

    /// Aggregate key with an unrecognized or non-storable function
    #[error("Aggregate key mismatch: {0}")]
    AggregateKeyMismatch(String),

    /// Input row lacks a value the configuration requires
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// A batch insert was rejected after all retries
    #[error(
        "Write to '{table}' failed at batch {batch} ({committed} batches committed): {message}"
    )]
    StoreWriteFailure {
        table: String,
        batch: usize,
        committed: usize,
        message: String,
    },

    /// Store error outside of batch writes (open, schema, reads)
    #[error("Store error: {0}")]
    Store(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigInvalid(message.into())
    }

    /// Create an aggregate key error
    pub fn key_mismatch(message: impl Into<String>) -> Self {
        Self::AggregateKeyMismatch(message.into())
    }

    /// Create an invalid record error
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord(message.into())
    }

    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }
}
