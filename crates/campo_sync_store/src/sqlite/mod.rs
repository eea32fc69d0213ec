//! SQLite-backed store.
//!
//! Connections are configured with:
//! - `journal_mode = WAL` so status readers do not block batch writers
//! - `busy_timeout = 5s` to absorb transient lock contention
//! - `foreign_keys = ON`
//!
//! Timestamps are stored as fixed-width RFC 3339 text (nanosecond
//! precision, `Z` suffix) so that text order matches time order.

mod migrations;
mod schema;

pub use migrations::{current_schema_version, LATEST_SCHEMA_VERSION};

use crate::entity::Entity;
use crate::error::{StoreError, StoreResult};
use crate::store::{StoreTransaction, SyncStore};
use campo_sync_protocol::{
    DeviceSyncStatus, EntityId, EntityType, OperationKind, Payload, SyncLogEntry, SyncStatus,
    Timestamp,
};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

/// Busy timeout applied to store connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A durable store on a single SQLite connection.
///
/// Transactions start with `BEGIN IMMEDIATE`, so the write lock is taken
/// before the first read and a detect-then-apply sequence cannot interleave
/// with another writer.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Opens (or creates) a store file and migrates it to the latest schema.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let store = Self::from_connection(conn)?;
        tracing::debug!(path = %path.display(), "opened sync store");
        Ok(store)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> StoreResult<Self> {
        configure_connection(&conn)?;
        migrations::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Returns the schema version of the open database.
    pub fn schema_version(&self) -> StoreResult<u32> {
        Ok(current_schema_version(&self.conn.lock())?)
    }
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

impl SyncStore for SqliteStore {
    fn transaction<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> Result<R, E>,
        E: From<StoreError>,
    {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;

        let mut view = SqliteTransaction { conn: &tx };
        // Dropping `tx` without commit rolls back.
        let result = f(&mut view)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(result)
    }
}

struct SqliteTransaction<'a> {
    conn: &'a Connection,
}

const ENTITY_COLUMNS: &str =
    "entity_type, id, fields, created_by, created_at, last_modified, deleted, version";

const LOG_COLUMNS: &str = "device_id, actor, idempotency_key, entity_type, entity_id, operation,
     client_timestamp, server_timestamp, status, error_message";

impl SqliteTransaction<'_> {
    fn checked(
        &self,
        entity_type: EntityType,
        id: EntityId,
        expected_version: Option<u64>,
    ) -> StoreResult<Entity> {
        let entity = self
            .get(entity_type, id)?
            .ok_or(StoreError::NotFound { entity_type, id })?;

        match expected_version {
            Some(expected) if entity.version != expected => Err(StoreError::VersionConflict {
                entity_type,
                id,
                expected,
                actual: entity.version,
            }),
            _ => Ok(entity),
        }
    }

    fn write_back(&self, entity: &Entity, previous_version: u64) -> StoreResult<()> {
        let changed = self.conn.execute(
            "UPDATE sync_entity
             SET fields = ?1, last_modified = ?2, deleted = ?3, version = ?4
             WHERE entity_type = ?5 AND id = ?6 AND version = ?7",
            params![
                serde_json::to_string(&entity.fields)?,
                encode_timestamp(&entity.last_modified),
                entity.deleted,
                to_sql_version(entity.version)?,
                entity.entity_type.as_str(),
                entity.id.get(),
                to_sql_version(previous_version)?,
            ],
        )?;

        if changed != 1 {
            return Err(self.stale(entity.entity_type, entity.id, previous_version));
        }
        Ok(())
    }

    /// Builds the error for a conditional write that matched no row.
    fn stale(&self, entity_type: EntityType, id: EntityId, expected: u64) -> StoreError {
        let stored = self
            .conn
            .query_row(
                "SELECT version FROM sync_entity WHERE entity_type = ?1 AND id = ?2",
                params![entity_type.as_str(), id.get()],
                |row| row.get::<_, i64>(0),
            )
            .optional();

        match stored {
            Ok(Some(version)) => match to_count(version) {
                Ok(actual) => StoreError::VersionConflict {
                    entity_type,
                    id,
                    expected,
                    actual,
                },
                Err(err) => err,
            },
            Ok(None) => StoreError::NotFound { entity_type, id },
            Err(err) => err.into(),
        }
    }
}

impl StoreTransaction for SqliteTransaction<'_> {
    fn get(&self, entity_type: EntityType, id: EntityId) -> StoreResult<Option<Entity>> {
        let raw = self
            .conn
            .query_row(
                &format!(
                    "SELECT {ENTITY_COLUMNS} FROM sync_entity WHERE entity_type = ?1 AND id = ?2"
                ),
                params![entity_type.as_str(), id.get()],
                RawEntity::from_row,
            )
            .optional()?;

        raw.map(RawEntity::into_entity).transpose()
    }

    fn create(
        &mut self,
        entity_type: EntityType,
        fields: Payload,
        created_at: Timestamp,
        created_by: &str,
    ) -> StoreResult<EntityId> {
        let next: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(id), 0) + 1 FROM sync_entity WHERE entity_type = ?1",
            [entity_type.as_str()],
            |row| row.get(0),
        )?;
        let id = EntityId::new(next);
        let entity = Entity::new(entity_type, id, fields, created_at, created_by);

        self.conn.execute(
            &format!(
                "INSERT INTO sync_entity ({ENTITY_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
            ),
            params![
                entity_type.as_str(),
                id.get(),
                serde_json::to_string(&entity.fields)?,
                entity.created_by,
                encode_timestamp(&entity.created_at),
                encode_timestamp(&entity.last_modified),
                entity.deleted,
                to_sql_version(entity.version)?,
            ],
        )?;

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
        let mut entity = self.checked(entity_type, id, expected_version)?;
        let previous = entity.version;
        entity.apply_update(fields, effective_timestamp);
        self.write_back(&entity, previous)?;
        Ok(entity)
    }

    fn soft_delete(
        &mut self,
        entity_type: EntityType,
        id: EntityId,
        expected_version: Option<u64>,
    ) -> StoreResult<()> {
        let mut entity = self.checked(entity_type, id, expected_version)?;
        let previous = entity.version;
        entity.mark_deleted();
        self.write_back(&entity, previous)
    }

    fn find_success(&self, idempotency_key: &str) -> StoreResult<bool> {
        Ok(self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM sync_log WHERE idempotency_key = ?1 AND status = 'success'
            )",
            [idempotency_key],
            |row| row.get(0),
        )?)
    }

    fn append_log(&mut self, entry: &SyncLogEntry) -> StoreResult<()> {
        let result = self.conn.execute(
            &format!(
                "INSERT INTO sync_log ({LOG_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                entry.device_id,
                entry.actor,
                entry.idempotency_key,
                entry.entity_type.as_str(),
                entry.entity_id.map(EntityId::get),
                entry.operation.as_str(),
                encode_timestamp(&entry.client_timestamp),
                encode_timestamp(&entry.server_timestamp),
                entry.status.as_str(),
                entry.error_message,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(err)
                if entry.status == SyncStatus::Success
                    && err.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) =>
            {
                Err(StoreError::DuplicateIdempotencyKey(
                    entry.idempotency_key.clone(),
                ))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn device_status(&self, device_id: &str) -> StoreResult<Option<DeviceSyncStatus>> {
        let (total, successes, last_sync): (i64, i64, Option<String>) = self.conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(status = 'success'), 0),
                    MAX(server_timestamp)
             FROM sync_log WHERE device_id = ?1",
            [device_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        if total == 0 {
            return Ok(None);
        }

        let pending: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sync_log AS c
             WHERE c.device_id = ?1
               AND c.status = 'conflict'
               AND NOT EXISTS (
                   SELECT 1 FROM sync_log AS s
                   WHERE s.device_id = c.device_id
                     AND s.status = 'success'
                     AND s.entity_type = c.entity_type
                     AND s.entity_id IS c.entity_id
                     AND s.id > c.id
               )",
            [device_id],
            |row| row.get(0),
        )?;

        let last_sync = last_sync.as_deref().map(decode_timestamp).transpose()?;

        Ok(Some(DeviceSyncStatus::from_counts(
            device_id,
            to_count(total)?,
            to_count(successes)?,
            last_sync,
            to_count(pending)?,
        )))
    }

    fn device_log(&self, device_id: &str) -> StoreResult<Vec<SyncLogEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {LOG_COLUMNS} FROM sync_log WHERE device_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map([device_id], RawLogEntry::from_row)?;

        let mut entries = Vec::new();
        for raw in rows {
            entries.push(raw?.into_entry()?);
        }
        Ok(entries)
    }
}

struct RawEntity {
    entity_type: String,
    id: i64,
    fields: String,
    created_by: String,
    created_at: String,
    last_modified: String,
    deleted: bool,
    version: i64,
}

impl RawEntity {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            entity_type: row.get(0)?,
            id: row.get(1)?,
            fields: row.get(2)?,
            created_by: row.get(3)?,
            created_at: row.get(4)?,
            last_modified: row.get(5)?,
            deleted: row.get(6)?,
            version: row.get(7)?,
        })
    }

    fn into_entity(self) -> StoreResult<Entity> {
        Ok(Entity {
            entity_type: decode_entity_type(&self.entity_type)?,
            id: EntityId::new(self.id),
            fields: serde_json::from_str(&self.fields)?,
            created_by: self.created_by,
            created_at: decode_timestamp(&self.created_at)?,
            last_modified: decode_timestamp(&self.last_modified)?,
            deleted: self.deleted,
            version: to_count(self.version)?,
        })
    }
}

struct RawLogEntry {
    device_id: String,
    actor: String,
    idempotency_key: String,
    entity_type: String,
    entity_id: Option<i64>,
    operation: String,
    client_timestamp: String,
    server_timestamp: String,
    status: String,
    error_message: Option<String>,
}

impl RawLogEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            device_id: row.get(0)?,
            actor: row.get(1)?,
            idempotency_key: row.get(2)?,
            entity_type: row.get(3)?,
            entity_id: row.get(4)?,
            operation: row.get(5)?,
            client_timestamp: row.get(6)?,
            server_timestamp: row.get(7)?,
            status: row.get(8)?,
            error_message: row.get(9)?,
        })
    }

    fn into_entry(self) -> StoreResult<SyncLogEntry> {
        Ok(SyncLogEntry {
            device_id: self.device_id,
            actor: self.actor,
            idempotency_key: self.idempotency_key,
            entity_type: decode_entity_type(&self.entity_type)?,
            entity_id: self.entity_id.map(EntityId::new),
            operation: OperationKind::parse(&self.operation).ok_or_else(|| {
                StoreError::Corrupted(format!("unknown operation {:?}", self.operation))
            })?,
            client_timestamp: decode_timestamp(&self.client_timestamp)?,
            server_timestamp: decode_timestamp(&self.server_timestamp)?,
            status: SyncStatus::parse(&self.status).ok_or_else(|| {
                StoreError::Corrupted(format!("unknown sync status {:?}", self.status))
            })?,
            error_message: self.error_message,
        })
    }
}

fn encode_timestamp(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_timestamp(raw: &str) -> StoreResult<Timestamp> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupted(format!("bad timestamp {raw:?}: {e}")))
}

fn decode_entity_type(raw: &str) -> StoreResult<EntityType> {
    EntityType::parse(raw)
        .ok_or_else(|| StoreError::Corrupted(format!("unknown entity type {raw:?}")))
}

fn to_sql_version(version: u64) -> StoreResult<i64> {
    i64::try_from(version)
        .map_err(|_| StoreError::Corrupted(format!("version {version} out of range")))
}

fn to_count(value: i64) -> StoreResult<u64> {
    u64::try_from(value).map_err(|_| StoreError::Corrupted(format!("negative count {value}")))
}
