//! Batch responses.

use crate::conflict::ConflictRecord;
use crate::error::ProtocolResult;
use crate::operation::{
    ConflictResolutionStrategy, EntityId, EntityType, OperationKind, SyncOperation, Timestamp,
};
use serde::{Deserialize, Serialize};

/// How a successful operation was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// The operation was applied.
    Success,
    /// The idempotency key had already been applied; nothing changed.
    AlreadyProcessed,
    /// A conflict was settled in the server's favor; nothing changed.
    ServerWins,
}

/// A successfully settled operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationOutcome {
    /// Operation key.
    pub idempotency_key: String,
    /// Entity type.
    pub entity_type: EntityType,
    /// Affected entity; for creates, the ID the server assigned.
    pub entity_id: Option<EntityId>,
    /// Operation type.
    pub operation: OperationKind,
    /// Outcome.
    pub status: OutcomeStatus,
    /// Strategy used when the operation went through conflict resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ConflictResolutionStrategy>,
}

impl OperationOutcome {
    /// Creates an outcome for `op`.
    pub fn new(op: &SyncOperation, status: OutcomeStatus) -> Self {
        Self {
            idempotency_key: op.idempotency_key.clone(),
            entity_type: op.entity_type,
            entity_id: op.entity_id,
            operation: op.operation,
            status,
            resolution: None,
        }
    }

    /// Sets the affected entity.
    pub fn with_entity_id(mut self, entity_id: Option<EntityId>) -> Self {
        self.entity_id = entity_id;
        self
    }

    /// Records the strategy that resolved a conflict.
    pub fn with_resolution(mut self, strategy: ConflictResolutionStrategy) -> Self {
        self.resolution = Some(strategy);
        self
    }
}

/// An operation that failed and was rolled back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationError {
    /// Operation key.
    pub idempotency_key: String,
    /// Entity type.
    pub entity_type: EntityType,
    /// Target entity, if any.
    pub entity_id: Option<EntityId>,
    /// Operation type.
    pub operation: OperationKind,
    /// Failure description.
    pub error: String,
}

impl OperationError {
    /// Creates an error entry for `op`.
    pub fn new(op: &SyncOperation, error: impl Into<String>) -> Self {
        Self {
            idempotency_key: op.idempotency_key.clone(),
            entity_type: op.entity_type,
            entity_id: op.entity_id,
            operation: op.operation,
            error: error.into(),
        }
    }
}

/// Result of processing one batch.
///
/// Every operation lands in exactly one of `successes`, `conflicts` or
/// `errors`, so the three lengths sum to `processed` unless the batch was
/// aborted by a fatal error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOperationResponse {
    /// Number of operations handled.
    pub processed: usize,
    /// Settled operations, in submission order.
    pub successes: Vec<OperationOutcome>,
    /// Unresolved conflicts awaiting manual review.
    pub conflicts: Vec<ConflictRecord>,
    /// Failed operations.
    pub errors: Vec<OperationError>,
    /// Server clock when the batch finished.
    pub server_timestamp: Timestamp,
}

impl SyncOperationResponse {
    /// Creates an empty response.
    pub fn new(server_timestamp: Timestamp) -> Self {
        Self {
            processed: 0,
            successes: Vec::new(),
            conflicts: Vec::new(),
            errors: Vec::new(),
            server_timestamp,
        }
    }

    /// Returns true if nothing conflicted or failed.
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty() && self.errors.is_empty()
    }

    /// Counts successes with the given status.
    pub fn count(&self, status: OutcomeStatus) -> usize {
        self.successes.iter().filter(|s| s.status == status).count()
    }

    /// Encodes the response as JSON bytes.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes a response from JSON bytes.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
