//! Error types for store operations.

use campo_sync_protocol::{EntityId, EntityType};
use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The entity does not exist.
    #[error("{entity_type} {id} not found")]
    NotFound {
        /// Entity type.
        entity_type: EntityType,
        /// Entity ID.
        id: EntityId,
    },

    /// A conditional write saw a different version than expected.
    #[error("{entity_type} {id} changed concurrently: expected version {expected}, found {actual}")]
    VersionConflict {
        /// Entity type.
        entity_type: EntityType,
        /// Entity ID.
        id: EntityId,
        /// Version the writer read.
        expected: u64,
        /// Version currently stored.
        actual: u64,
    },

    /// A success entry already exists for this idempotency key.
    #[error("idempotency key {0} already processed")]
    DuplicateIdempotencyKey(String),

    /// A relational or domain constraint was violated.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// SQLite reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Stored JSON could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row could not be interpreted.
    #[error("store corrupted: {0}")]
    Corrupted(String),

    /// The store cannot serve requests.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    /// Returns true if retrying the same write may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }

    /// Returns true if the error is caused by the data being written
    /// rather than by the store itself.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            StoreError::NotFound { .. }
                | StoreError::VersionConflict { .. }
                | StoreError::DuplicateIdempotencyKey(_)
                | StoreError::Constraint(_)
        )
    }
}
