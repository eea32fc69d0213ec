//! Sync log entries and per-device status.

use crate::operation::{EntityId, EntityType, OperationKind, SyncOperation, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal (or pending) state of an operation in the sync log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// The operation was applied (or deliberately skipped) and is done.
    Success,
    /// The operation failed and was rolled back.
    Error,
    /// The operation awaits manual conflict resolution.
    Conflict,
}

impl SyncStatus {
    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Success => "success",
            SyncStatus::Error => "error",
            SyncStatus::Conflict => "conflict",
        }
    }

    /// Parses a wire name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "success" => Some(SyncStatus::Success),
            "error" => Some(SyncStatus::Error),
            "conflict" => Some(SyncStatus::Conflict),
            _ => None,
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the sync audit trail.
///
/// Only `Success` entries count toward idempotency; a key with nothing
/// but `Error` or `Conflict` entries may be submitted again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    /// Device that submitted the operation.
    pub device_id: String,
    /// User or service the batch ran on behalf of.
    pub actor: String,
    /// Operation key.
    pub idempotency_key: String,
    /// Entity type.
    pub entity_type: EntityType,
    /// Affected entity (the generated ID for creates).
    pub entity_id: Option<EntityId>,
    /// Operation type.
    pub operation: OperationKind,
    /// Device clock of the operation.
    pub client_timestamp: Timestamp,
    /// Server clock when the outcome was recorded.
    pub server_timestamp: Timestamp,
    /// Outcome.
    pub status: SyncStatus,
    /// Failure description for `Error` entries.
    pub error_message: Option<String>,
}

impl SyncLogEntry {
    /// Creates an entry describing `op`'s outcome.
    pub fn new(
        op: &SyncOperation,
        device_id: &str,
        actor: &str,
        status: SyncStatus,
        server_timestamp: Timestamp,
    ) -> Self {
        Self {
            device_id: device_id.to_string(),
            actor: actor.to_string(),
            idempotency_key: op.idempotency_key.clone(),
            entity_type: op.entity_type,
            entity_id: op.entity_id,
            operation: op.operation,
            client_timestamp: op.client_timestamp,
            server_timestamp,
            status,
            error_message: None,
        }
    }

    /// Sets the affected entity.
    pub fn with_entity_id(mut self, entity_id: Option<EntityId>) -> Self {
        self.entity_id = entity_id;
        self
    }

    /// Attaches a failure description.
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// Aggregated sync history of one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSyncStatus {
    /// Device identifier.
    pub device_id: String,
    /// Number of log entries recorded for the device.
    pub total_synced: u64,
    /// Most recent server timestamp among the device's entries.
    pub last_sync: Option<Timestamp>,
    /// Fraction of entries with `Success` status.
    pub success_rate: f64,
    /// Manual conflicts not yet followed by a success on the same entity.
    pub pending_conflicts: u64,
}

impl DeviceSyncStatus {
    /// Builds a status from raw counters.
    pub fn from_counts(
        device_id: impl Into<String>,
        total: u64,
        successes: u64,
        last_sync: Option<Timestamp>,
        pending_conflicts: u64,
    ) -> Self {
        let success_rate = if total > 0 {
            successes as f64 / total as f64
        } else {
            0.0
        };

        Self {
            device_id: device_id.into(),
            total_synced: total,
            last_sync,
            success_rate,
            pending_conflicts,
        }
    }
}
