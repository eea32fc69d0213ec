//! Store traits.

use crate::entity::Entity;
use crate::error::{StoreError, StoreResult};
use campo_sync_protocol::{
    DeviceSyncStatus, EntityId, EntityType, Payload, SyncLogEntry, Timestamp,
};

/// A transactional view over entities, the idempotency ledger and the
/// sync log.
///
/// Everything done through one view commits or rolls back together.
///
/// # Invariants
///
/// - `create` assigns a fresh ID and version 1
/// - `update` and `soft_delete` bump the version by one
/// - a write with `expected_version = Some(v)` fails with
///   [`StoreError::VersionConflict`] unless the stored version is `v`
/// - at most one `Success` log entry exists per idempotency key; a second
///   one fails with [`StoreError::DuplicateIdempotencyKey`]
pub trait StoreTransaction {
    /// Returns the entity, including soft-deleted ones.
    fn get(&self, entity_type: EntityType, id: EntityId) -> StoreResult<Option<Entity>>;

    /// Inserts a new entity and returns its ID.
    fn create(
        &mut self,
        entity_type: EntityType,
        fields: Payload,
        created_at: Timestamp,
        created_by: &str,
    ) -> StoreResult<EntityId>;

    /// Overlays `fields` on the entity and sets `last_modified` to
    /// `effective_timestamp`. Returns the updated entity.
    fn update(
        &mut self,
        entity_type: EntityType,
        id: EntityId,
        fields: &Payload,
        effective_timestamp: Timestamp,
        expected_version: Option<u64>,
    ) -> StoreResult<Entity>;

    /// Sets the soft-delete flag. The row is never removed.
    fn soft_delete(
        &mut self,
        entity_type: EntityType,
        id: EntityId,
        expected_version: Option<u64>,
    ) -> StoreResult<()>;

    /// Returns true if a success entry exists for `idempotency_key`.
    fn find_success(&self, idempotency_key: &str) -> StoreResult<bool>;

    /// Appends an entry to the sync log.
    fn append_log(&mut self, entry: &SyncLogEntry) -> StoreResult<()>;

    /// Aggregates the device's log, or `None` if it has no entries.
    fn device_status(&self, device_id: &str) -> StoreResult<Option<DeviceSyncStatus>>;

    /// Returns the device's log entries in insertion order.
    fn device_log(&self, device_id: &str) -> StoreResult<Vec<SyncLogEntry>>;
}

/// A shareable store handing out transactions.
///
/// Implementations must be `Send + Sync` so that one store can serve
/// several batch workers.
pub trait SyncStore: Send + Sync {
    /// Runs `f` in a transaction.
    ///
    /// The transaction commits if `f` returns `Ok` and rolls back if it
    /// returns `Err`. Failures to begin or commit are converted into `E`.
    fn transaction<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> Result<R, E>,
        E: From<StoreError>;

    /// Returns true if `idempotency_key` has a success entry.
    fn find_success(&self, idempotency_key: &str) -> StoreResult<bool> {
        self.transaction(|txn| txn.find_success(idempotency_key))
    }

    /// Appends one log entry in its own transaction.
    fn append_log(&self, entry: &SyncLogEntry) -> StoreResult<()> {
        self.transaction(|txn| txn.append_log(entry))
    }

    /// Reads one entity outside any batch.
    fn get(&self, entity_type: EntityType, id: EntityId) -> StoreResult<Option<Entity>> {
        self.transaction(|txn| txn.get(entity_type, id))
    }

    /// Aggregates the device's log.
    fn device_status(&self, device_id: &str) -> StoreResult<Option<DeviceSyncStatus>> {
        self.transaction(|txn| txn.device_status(device_id))
    }

    /// Returns the device's log entries.
    fn device_log(&self, device_id: &str) -> StoreResult<Vec<SyncLogEntry>> {
        self.transaction(|txn| txn.device_log(device_id))
    }
}
