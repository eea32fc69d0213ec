//! Error types for the sync protocol.

use crate::operation::OperationKind;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while decoding or validating protocol messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The payload is not valid JSON for the expected message.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The message decoded but violates a protocol rule.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// A malformed batch or operation, rejected before any processing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The batch has no device identifier.
    #[error("device_id must not be empty")]
    EmptyDeviceId,

    /// The batch contains no operations.
    #[error("batch must contain at least one operation")]
    EmptyBatch,

    /// The batch exceeds the configured maximum size.
    #[error("too many operations: {len} > {max}")]
    BatchTooLarge {
        /// Number of operations submitted.
        len: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// The idempotency key is not a UUID in canonical form.
    #[error("operation {index}: idempotency_key {key:?} is not a lowercase hyphenated UUID")]
    InvalidIdempotencyKey {
        /// Position of the operation in the batch.
        index: usize,
        /// The offending key.
        key: String,
    },

    /// An update or delete without a target entity.
    #[error("operation {index}: entity_id is required for {operation}")]
    MissingEntityId {
        /// Position of the operation in the batch.
        index: usize,
        /// The operation kind.
        operation: OperationKind,
    },
}

impl ValidationError {
    /// Returns the batch position of the offending operation, if any.
    pub fn operation_index(&self) -> Option<usize> {
        match self {
            ValidationError::InvalidIdempotencyKey { index, .. }
            | ValidationError::MissingEntityId { index, .. } => Some(*index),
            _ => None,
        }
    }
}
