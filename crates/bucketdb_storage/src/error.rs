//! Error types for document store operations.

use std::io;
use thiserror::Error;

/// Result type for document store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during document store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A document or snapshot could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No live document exists at the key.
    #[error("document not found: {key}")]
    NotFound {
        /// The requested key.
        key: String,
    },

    /// The supplied revision does not match the stored one.
    #[error("revision conflict on {key}")]
    Conflict {
        /// The key that conflicted.
        key: String,
    },

    /// The store contents are corrupted.
    #[error("store corrupted: {0}")]
    Corrupted(String),

    /// The store could not service the operation.
    #[error("store unavailable during {operation}")]
    Unavailable {
        /// The operation that failed.
        operation: String,
    },
}

impl StoreError {
    /// Creates a not-found error.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Creates a conflict error.
    pub fn conflict(key: impl Into<String>) -> Self {
        Self::Conflict { key: key.into() }
    }

    /// Creates an unavailable error.
    pub fn unavailable(operation: impl Into<String>) -> Self {
        Self::Unavailable {
            operation: operation.into(),
        }
    }

    /// Returns true if repeating the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Io(_) | StoreError::Unavailable { .. })
    }
}
