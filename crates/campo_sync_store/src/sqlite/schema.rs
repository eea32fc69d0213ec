//! SQLite schema.

/// Entities and the sync log.
///
/// `sync_log` doubles as the idempotency ledger: the partial unique index
/// allows any number of error and conflict entries per key but at most one
/// success entry.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS sync_entity (
    entity_type   TEXT    NOT NULL,
    id            INTEGER NOT NULL,
    fields        TEXT    NOT NULL,
    created_by    TEXT    NOT NULL,
    created_at    TEXT    NOT NULL,
    last_modified TEXT    NOT NULL,
    deleted       INTEGER NOT NULL DEFAULT 0,
    version       INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY (entity_type, id)
);

CREATE TABLE IF NOT EXISTS sync_log (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    device_id        TEXT    NOT NULL,
    actor            TEXT    NOT NULL,
    idempotency_key  TEXT    NOT NULL,
    entity_type      TEXT    NOT NULL,
    entity_id        INTEGER,
    operation        TEXT    NOT NULL,
    client_timestamp TEXT    NOT NULL,
    server_timestamp TEXT    NOT NULL,
    status           TEXT    NOT NULL CHECK (status IN ('success', 'error', 'conflict')),
    error_message    TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_sync_log_success_key
    ON sync_log (idempotency_key)
    WHERE status = 'success';

CREATE INDEX IF NOT EXISTS idx_sync_log_device
    ON sync_log (device_id, id);
";

/// Lookup of an entity's history by (type, id), used by conflict queries.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_sync_log_entity
    ON sync_log (entity_type, entity_id, status);
";
