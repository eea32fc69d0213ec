//! # Campo Sync Protocol
//!
//! Wire types and JSON codec for offline synchronization of field data.
//!
//! This crate provides:
//! - `SyncOperation` and `SyncBatch` for client-originated mutations
//! - `ConflictRecord` for conflicts surfaced to the client
//! - `SyncLogEntry` and `DeviceSyncStatus` for the audit trail
//! - `SyncOperationResponse` for per-batch results
//! - Batch validation
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod batch;
mod conflict;
mod error;
mod log;
mod operation;
mod response;

pub use batch::{validate_operations, SyncBatch, DEFAULT_MAX_BATCH_OPERATIONS};
pub use conflict::{ConflictRecord, ConflictType};
pub use error::{ProtocolError, ProtocolResult, ValidationError};
pub use log::{DeviceSyncStatus, SyncLogEntry, SyncStatus};
pub use operation::{
    canonical_idempotency_key, ConflictResolutionStrategy, EntityId, EntityType, OperationKind,
    Payload, SyncOperation, Timestamp,
};
pub use response::{OperationError, OperationOutcome, OutcomeStatus, SyncOperationResponse};
