//! Error types for bucketdb core.

use bucketdb_storage::StoreError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// A document that a bulk write rejected.
#[derive(Debug)]
pub struct WriteFailure {
    /// Key of the rejected document.
    pub key: String,
    /// Why the store rejected it.
    pub error: StoreError,
}

/// Errors that can occur in bucketdb core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No document at the requested key.
    #[error("not found: {key}")]
    NotFound {
        /// The key that was looked up.
        key: String,
    },

    /// `add_bucket` on a group that already has a bucket.
    #[error("bucket already exists: {name}")]
    DuplicateBucket {
        /// The bucket's group name.
        name: String,
    },

    /// Strict update of a bucket that doesn't exist.
    #[error("bucket does not exist: {name}")]
    MissingBucket {
        /// The bucket's group name.
        name: String,
    },

    /// Malformed input: empty key segments, unknown fields, invalid values.
    #[error("validation failed: {message}")]
    Validation {
        /// Description of what was rejected.
        message: String,
    },

    /// Revision mismatch on a single-document write.
    #[error("revision conflict on {key}")]
    Conflict {
        /// The key that conflicted.
        key: String,
    },

    /// Some documents of a bulk write were rejected.
    #[error("{} of {total} documents failed to write", failures.len())]
    PartialWrite {
        /// The rejected documents.
        failures: Vec<WriteFailure>,
        /// Number of documents in the bulk write.
        total: usize,
    },

    /// The document store failed.
    #[error("store error: {0}")]
    Store(StoreError),

    /// A stored document could not be decoded.
    #[error("malformed document {key}: {message}")]
    MalformedDocument {
        /// The offending key.
        key: String,
        /// What was wrong with it.
        message: String,
    },
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { key } => Self::NotFound { key },
            StoreError::Conflict { key } => Self::Conflict { key },
            other => Self::Store(other),
        }
    }
}

impl CoreError {
    /// Creates a not found error.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a malformed document error.
    pub fn malformed(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedDocument {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Returns true if repeating the operation may succeed.
    ///
    /// Partial writes are retryable when every rejected document failed for a
    /// transient reason; re-running `save` only resends what didn't land.
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::Store(err) => err.is_retryable(),
            CoreError::PartialWrite { failures, .. } => {
                failures.iter().all(|failure| failure.error.is_retryable())
            }
            _ => false,
        }
    }

    /// Returns the keys that a partial write failed to store.
    pub fn failed_keys(&self) -> Vec<&str> {
        match self {
            CoreError::PartialWrite { failures, .. } => {
                failures.iter().map(|failure| failure.key.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_onto_core_taxonomy() {
        let err: CoreError = StoreError::not_found("p/1/").into();
        assert!(matches!(err, CoreError::NotFound { ref key } if key == "p/1/"));

        let err: CoreError = StoreError::conflict("p/1/").into();
        assert!(matches!(err, CoreError::Conflict { .. }));

        let err: CoreError = StoreError::unavailable("range_scan").into();
        assert!(matches!(err, CoreError::Store(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn partial_write_retryability() {
        let transient = CoreError::PartialWrite {
            failures: vec![WriteFailure {
                key: "p/1/a".into(),
                error: StoreError::unavailable("write p/1/a"),
            }],
            total: 3,
        };
        assert!(transient.is_retryable());
        assert_eq!(transient.failed_keys(), vec!["p/1/a"]);
        assert_eq!(transient.to_string(), "1 of 3 documents failed to write");

        let conflict = CoreError::PartialWrite {
            failures: vec![WriteFailure {
                key: "p/1/a".into(),
                error: StoreError::conflict("p/1/a"),
            }],
            total: 1,
        };
        assert!(!conflict.is_retryable());
    }

    #[test]
    fn error_display() {
        let err = CoreError::DuplicateBucket {
            name: "address".into(),
        };
        assert_eq!(err.to_string(), "bucket already exists: address");
    }
}
