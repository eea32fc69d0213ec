//! In-memory store for testing.

use crate::entity::Entity;
use crate::error::{StoreError, StoreResult};
use crate::status::summarize_device;
use crate::store::{StoreTransaction, SyncStore};
use campo_sync_protocol::{
    DeviceSyncStatus, EntityId, EntityType, Payload, SyncLogEntry, SyncStatus, Timestamp,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    entities: BTreeMap<(EntityType, EntityId), Entity>,
    next_ids: BTreeMap<EntityType, i64>,
    log: Vec<SyncLogEntry>,
    success_keys: HashSet<String>,
}

/// An in-memory store.
///
/// Each transaction holds the store lock for its whole duration and works
/// on a copy of the state, which replaces the original on commit. This
/// gives serializable transactions at the cost of a full copy per
/// transaction, which is fine for tests and small ephemeral stores.
///
/// # Example
///
/// ```rust
/// use campo_sync_protocol::{EntityType, Payload};
/// use campo_sync_store::{MemoryStore, StoreError, SyncStore};
/// use chrono::Utc;
///
/// let store = MemoryStore::new();
/// let id = store
///     .transaction(|txn| txn.create(EntityType::Activity, Payload::new(), Utc::now(), "agente"))
///     .unwrap();
/// assert!(store.get(EntityType::Activity, id).unwrap().is_some());
///
/// // Errors roll back.
/// let result: Result<(), StoreError> = store.transaction(|txn| {
///     txn.create(EntityType::Activity, Payload::new(), Utc::now(), "agente")?;
///     Err(StoreError::Constraint("rejected".into()))
/// });
/// assert!(result.is_err());
/// assert_eq!(store.entity_count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an entity as-is, bypassing versioning.
    ///
    /// Useful for setting up server-side state in tests.
    pub fn insert_entity(&self, entity: Entity) {
        let mut state = self.state.lock();
        let next = state.next_ids.entry(entity.entity_type).or_insert(1);
        *next = (*next).max(entity.id.get() + 1);
        state.entities.insert((entity.entity_type, entity.id), entity);
    }

    /// Returns the number of stored entities, deleted ones included.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.state.lock().entities.len()
    }

    /// Returns a copy of the whole sync log.
    #[must_use]
    pub fn log(&self) -> Vec<SyncLogEntry> {
        self.state.lock().log.clone()
    }
}

impl SyncStore for MemoryStore {
    fn transaction<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> Result<R, E>,
        E: From<StoreError>,
    {
        let mut guard = self.state.lock();
        let mut txn = MemoryTransaction {
            state: guard.clone(),
        };
        let result = f(&mut txn)?;
        *guard = txn.state;
        Ok(result)
    }
}

struct MemoryTransaction {
    state: MemoryState,
}

impl MemoryTransaction {
    fn entity_mut(
        &mut self,
        entity_type: EntityType,
        id: EntityId,
        expected_version: Option<u64>,
    ) -> StoreResult<&mut Entity> {
        let entity = self
            .state
            .entities
            .get_mut(&(entity_type, id))
            .ok_or(StoreError::NotFound { entity_type, id })?;

        if let Some(expected) = expected_version {
            if entity.version != expected {
                return Err(StoreError::VersionConflict {
                    entity_type,
                    id,
                    expected,
                    actual: entity.version,
                });
            }
        }

        Ok(entity)
    }
}

impl StoreTransaction for MemoryTransaction {
    fn get(&self, entity_type: EntityType, id: EntityId) -> StoreResult<Option<Entity>> {
        Ok(self.state.entities.get(&(entity_type, id)).cloned())
    }

    fn create(
        &mut self,
        entity_type: EntityType,
        fields: Payload,
        created_at: Timestamp,
        created_by: &str,
    ) -> StoreResult<EntityId> {
        let next = self.state.next_ids.entry(entity_type).or_insert(1);
        let id = EntityId::new(*next);
        *next += 1;

        let entity = Entity::new(entity_type, id, fields, created_at, created_by);
        self.state.entities.insert((entity_type, id), entity);
        Ok(id)
    }

    fn update(
        &mut self,
        entity_type: EntityType,
        id: EntityId,
        fields: &Payload,
        effective_timestamp: Timestamp,
        expected_version: Option<u64>,
    ) -> StoreResult<Entity> {
        let entity = self.entity_mut(entity_type, id, expected_version)?;
        entity.apply_update(fields, effective_timestamp);
        Ok(entity.clone())
    }

    fn soft_delete(
        &mut self,
        entity_type: EntityType,
        id: EntityId,
        expected_version: Option<u64>,
    ) -> StoreResult<()> {
        self.entity_mut(entity_type, id, expected_version)?
            .mark_deleted();
        Ok(())
    }

    fn find_success(&self, idempotency_key: &str) -> StoreResult<bool> {
        Ok(self.state.success_keys.contains(idempotency_key))
    }

    fn append_log(&mut self, entry: &SyncLogEntry) -> StoreResult<()> {
        if entry.status == SyncStatus::Success
            && !self.state.success_keys.insert(entry.idempotency_key.clone())
        {
            return Err(StoreError::DuplicateIdempotencyKey(
                entry.idempotency_key.clone(),
            ));
        }
        self.state.log.push(entry.clone());
        Ok(())
    }

    fn device_status(&self, device_id: &str) -> StoreResult<Option<DeviceSyncStatus>> {
        let entries = self.device_log(device_id)?;
        Ok(summarize_device(device_id, &entries))
    }

    fn device_log(&self, device_id: &str) -> StoreResult<Vec<SyncLogEntry>> {
        Ok(self
            .state
            .log
            .iter()
            .filter(|e| e.device_id == device_id)
            .cloned()
            .collect())
    }
}
