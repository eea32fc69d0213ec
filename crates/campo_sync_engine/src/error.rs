//! Error types for the sync engine.

use crate::handler::FieldKind;
use campo_sync_protocol::{EntityType, OperationKind, ValidationError};
use campo_sync_store::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Result type for batch-level operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type for applying a single operation.
pub type ApplyResult<T> = Result<T, ApplyError>;

/// Errors that abort a whole request.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The batch was rejected before processing.
    #[error("invalid batch: {0}")]
    Validation(#[from] ValidationError),

    /// The idempotency ledger or sync log could not be read or written
    /// outside an operation's transaction.
    #[error("ledger failure: {0}")]
    Ledger(#[source] StoreError),

    /// A read-only store query failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The device has no sync history.
    #[error("device {0} not found")]
    DeviceNotFound(String),

    /// A batch worker failed.
    #[error("worker failed: {0}")]
    Worker(String),

    /// The service no longer accepts batches.
    #[error("sync service is shutting down")]
    ShuttingDown,
}

impl SyncError {
    /// Returns true if the caller sent something it should fix.
    pub fn is_client_error(&self) -> bool {
        matches!(self, SyncError::Validation(_) | SyncError::DeviceNotFound(_))
    }

    /// Returns true if the batch stopped partway and its remaining
    /// operations were not processed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Ledger(_) | SyncError::Worker(_))
    }
}

/// A failure applying one operation. The operation is rolled back and
/// reported; the rest of the batch continues.
#[derive(Error, Debug)]
pub enum ApplyError {
    /// The store rejected the write.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The payload names a field the entity does not have.
    #[error("unknown field {field:?} for {entity_type}")]
    UnknownField {
        /// Entity type.
        entity_type: EntityType,
        /// Offending field.
        field: String,
    },

    /// The payload has a field of the wrong type.
    #[error("field {field:?} of {entity_type} must be {expected}")]
    InvalidField {
        /// Entity type.
        entity_type: EntityType,
        /// Offending field.
        field: String,
        /// Expected kind.
        expected: FieldKind,
    },

    /// A required field is absent on create.
    #[error("missing required field {field:?} for {entity_type}")]
    MissingField {
        /// Entity type.
        entity_type: EntityType,
        /// Missing field.
        field: String,
    },

    /// A domain rule was violated.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// No handler is registered for the entity type.
    #[error("unsupported entity type: {0}")]
    UnsupportedEntity(EntityType),

    /// An update or delete reached the applier without a target.
    #[error("{0} requires an entity_id")]
    MissingEntityId(OperationKind),

    /// The operation's transaction ran past its budget.
    #[error("operation exceeded its budget: {elapsed:?} > {budget:?}")]
    BudgetExceeded {
        /// Time spent.
        elapsed: Duration,
        /// Configured budget.
        budget: Duration,
    },

    /// The batch deadline passed before the operation started.
    #[error("batch deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),
}

impl ApplyError {
    /// Returns true if the operation may succeed when retried from
    /// detection.
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, ApplyError::Store(StoreError::VersionConflict { .. }))
    }

    /// Returns true if the payload itself was rejected.
    pub fn is_payload_error(&self) -> bool {
        matches!(
            self,
            ApplyError::UnknownField { .. }
                | ApplyError::InvalidField { .. }
                | ApplyError::MissingField { .. }
        )
    }
}
