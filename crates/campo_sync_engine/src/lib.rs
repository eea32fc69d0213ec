//! # Campo Sync Engine
//!
//! Server-side processing of offline field-data batches.
//!
//! This crate provides:
//! - Conflict detection against the stored entity
//! - Resolution strategies (client wins, server wins, last write wins,
//!   deep merge, manual)
//! - Per-entity-type handlers with payload validation
//! - An idempotent batch processor with per-operation isolation
//! - An async service that runs batches from many devices concurrently
//!
//! ## Key Invariants
//!
//! - An idempotency key is applied at most once
//! - A failed operation never affects the others in its batch
//! - Operations are processed in submission order
//! - Manual conflicts are reported and never applied
//! - Every operation that reaches the store leaves a sync log entry;
//!   replays answered from the ledger are not logged again

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod applier;
mod config;
mod detector;
mod error;
mod handler;
mod merge;
mod processor;
mod resolver;
mod service;

pub use applier::OperationApplier;
pub use config::EngineConfig;
pub use detector::detect;
pub use error::{ApplyError, ApplyResult, SyncError, SyncResult};
pub use handler::{
    validate_payload, with_defaults, ActivityHandler, ApplyContext, EntityHandler,
    EvidenceHandler, FieldDefault, FieldKind, FieldSpec, HandlerRegistry,
};
pub use merge::merge;
pub use processor::{BatchProcessor, ProcessorStats};
pub use resolver::{resolve, Resolution};
pub use service::SyncService;
