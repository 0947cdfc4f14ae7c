//! Error types for Pledge Core
//!
//! Two layers: [`StoreError`] is what a record backend reports, [`PledgeError`] is what
//! the promise manager surfaces to callers. Both are `thiserror` enums.

use thiserror::Error;

use crate::types::PromiseId;

/// Result type alias for promise operations
pub type Result<T> = std::result::Result<T, PledgeError>;

/// Main error type for promise operations
#[derive(Error, Debug)]
pub enum PledgeError {
    /// No record with this identifier exists in the store
    #[error("Unknown promise identifier: {0}")]
    UnknownIdentifier(PromiseId),

    /// The record already holds a terminal state
    #[error("Promise {id} already resolved ({state})")]
    AlreadyResolved { id: PromiseId, state: String },

    /// The record store could not durably complete the operation.
    /// The caller must assume the operation did not happen.
    #[error("Storage failure: {0}")]
    StorageFailure(#[from] StoreError),

    /// Stored bytes for an identifier could not be decoded
    #[error("Corrupt record {id}: {reason}")]
    CorruptRecord { id: PromiseId, reason: String },

    /// A lifecycle listener is already attached to this manager
    #[error("Promise manager is already listening for lifecycle events")]
    AlreadyListening,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PledgeError {
    /// True for errors that indicate caller misuse rather than an environmental failure
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            PledgeError::UnknownIdentifier(_)
                | PledgeError::AlreadyResolved { .. }
                | PledgeError::AlreadyListening
        )
    }
}

/// Errors raised by a [`RecordStore`](crate::storage::RecordStore) backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored checksum does not match the stored bytes
    #[error("Integrity check failed for {id}: expected {expected}, found {actual}")]
    Integrity {
        id: String,
        expected: String,
        actual: String,
    },

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_failure_wraps_store_error() {
        let err: PledgeError = StoreError::Unavailable("disk full".to_string()).into();
        assert!(matches!(err, PledgeError::StorageFailure(_)));
        assert!(err.to_string().contains("disk full"));
        assert!(!err.is_caller_error());
    }

    #[test]
    fn test_caller_errors() {
        let id = PromiseId::generate();
        assert!(PledgeError::UnknownIdentifier(id).is_caller_error());
        let err = PledgeError::AlreadyResolved {
            id,
            state: "fulfilled".to_string(),
        };
        assert!(err.is_caller_error());
        assert!(err.to_string().contains("fulfilled"));
    }
}
