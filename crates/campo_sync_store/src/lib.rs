//! # Campo Sync Store
//!
//! Persistence seams of the sync engine: the entity store, the idempotency
//! ledger and the sync log, all reached through one transactional view.
//!
//! ## Design Principles
//!
//! - One [`SyncStore::transaction`] covers detection, application and the
//!   success log entry of an operation
//! - Entity writes can be made conditional on the version read earlier
//! - The ledger is the set of success entries in the sync log; storage
//!   rejects a second success entry for the same key
//! - Stores are `Send + Sync` and can be shared between batch workers
//!
//! ## Available Stores
//!
//! - [`MemoryStore`] - For tests and ephemeral use
//! - [`SqliteStore`] - Durable store on a bundled SQLite database

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod entity;
mod error;
mod memory;
mod sqlite;
mod status;
mod store;

pub use entity::Entity;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use sqlite::{current_schema_version, SqliteStore, DEFAULT_BUSY_TIMEOUT, LATEST_SCHEMA_VERSION};
pub use status::summarize_device;
pub use store::{StoreTransaction, SyncStore};
