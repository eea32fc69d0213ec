//! Sync batches.

use crate::error::{ProtocolResult, ValidationError};
use crate::operation::SyncOperation;
use serde::{Deserialize, Serialize};

/// Default upper bound on operations in one batch.
pub const DEFAULT_MAX_BATCH_OPERATIONS: usize = 100;

/// An ordered set of operations submitted by one device in one sync round.
///
/// Order is meaningful: operations are processed strictly in the order
/// they appear here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncBatch {
    /// Unique device identifier.
    pub device_id: String,
    /// Client-side batch label, used only for tracing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    /// Operations in submission order.
    pub operations: Vec<SyncOperation>,
}

impl SyncBatch {
    /// Creates a new batch.
    pub fn new(device_id: impl Into<String>, operations: Vec<SyncOperation>) -> Self {
        Self {
            device_id: device_id.into(),
            batch_id: None,
            operations,
        }
    }

    /// Sets the batch label.
    pub fn with_batch_id(mut self, batch_id: impl Into<String>) -> Self {
        self.batch_id = Some(batch_id.into());
        self
    }

    /// Returns the number of operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns true if the batch has no operations.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Validates the batch against `max_operations`.
    pub fn validate(&self, max_operations: usize) -> Result<(), ValidationError> {
        validate_operations(&self.device_id, &self.operations, max_operations)
    }

    /// Decodes a batch from JSON bytes.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Encodes the batch as JSON bytes.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Validates a device's operations before any of them is processed.
pub fn validate_operations(
    device_id: &str,
    operations: &[SyncOperation],
    max_operations: usize,
) -> Result<(), ValidationError> {
    if device_id.trim().is_empty() {
        return Err(ValidationError::EmptyDeviceId);
    }

    if operations.is_empty() {
        return Err(ValidationError::EmptyBatch);
    }

    if operations.len() > max_operations {
        return Err(ValidationError::BatchTooLarge {
            len: operations.len(),
            max: max_operations,
        });
    }

    operations
        .iter()
        .enumerate()
        .try_for_each(|(index, op)| op.validate(index))
}
