//! Behavioral tests shared by every store implementation.

use campo_sync_protocol::{
    EntityId, EntityType, Payload, SyncLogEntry, SyncOperation, SyncStatus, Timestamp,
};
use campo_sync_store::{MemoryStore, SqliteStore, StoreError, StoreResult, SyncStore};
use chrono::{Duration, TimeZone, Utc};
use serde_json::json;

fn ts() -> Timestamp {
    Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 0).unwrap()
}

fn key(n: u32) -> String {
    format!("00000000-0000-4000-8000-{n:012}")
}

fn payload(pairs: &[(&str, serde_json::Value)]) -> Payload {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

fn log_entry(n: u32, id: i64, status: SyncStatus) -> SyncLogEntry {
    let op = SyncOperation::update(key(n), EntityType::Activity, EntityId::new(id), Payload::new(), ts());
    SyncLogEntry::new(&op, "android-1", "agente", status, ts())
}

fn partial_update_keeps_other_fields<S: SyncStore>(store: &S) {
    let id = store
        .transaction(|txn| {
            txn.create(
                EntityType::Activity,
                payload(&[("kind", json!("VISITA")), ("status", json!("CRIADA"))]),
                ts(),
                "agente",
            )
        })
        .unwrap();

    let later = ts() + Duration::minutes(5);
    store
        .transaction(|txn| {
            txn.update(
                EntityType::Activity,
                id,
                &payload(&[("status", json!("EM_ANDAMENTO"))]),
                later,
                Some(1),
            )
        })
        .unwrap();

    let entity = store.get(EntityType::Activity, id).unwrap().unwrap();
    assert_eq!(entity.fields["kind"], json!("VISITA"));
    assert_eq!(entity.fields["status"], json!("EM_ANDAMENTO"));
    assert_eq!(entity.last_modified, later);
    assert_eq!(entity.version, 2);
}

fn missing_entity_errors<S: SyncStore>(store: &S) {
    let missing = EntityId::new(999);
    let err = store
        .transaction(|txn| txn.update(EntityType::Activity, missing, &Payload::new(), ts(), None))
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { id, .. } if id == missing));

    let err = store
        .transaction(|txn| txn.soft_delete(EntityType::Evidence, missing, None))
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

fn success_is_unique_per_key<S: SyncStore>(store: &S) {
    store.append_log(&log_entry(1, 1, SyncStatus::Conflict)).unwrap();
    assert!(!store.find_success(&key(1)).unwrap());

    store.append_log(&log_entry(1, 1, SyncStatus::Success)).unwrap();
    assert!(store.find_success(&key(1)).unwrap());

    // A duplicate inside a larger transaction rolls the whole thing back.
    let result: StoreResult<()> = store.transaction(|txn| {
        txn.create(EntityType::Activity, Payload::new(), ts(), "agente")?;
        txn.append_log(&log_entry(1, 1, SyncStatus::Success))
    });
    assert!(matches!(result, Err(StoreError::DuplicateIdempotencyKey(_))));
    assert!(store.get(EntityType::Activity, EntityId::new(1)).unwrap().is_none());

    assert_eq!(store.device_log("android-1").unwrap().len(), 2);
}

fn device_status_matches<S: SyncStore>(store: &S) {
    store.append_log(&log_entry(1, 7, SyncStatus::Conflict)).unwrap();
    store.append_log(&log_entry(2, 7, SyncStatus::Success)).unwrap();
    store.append_log(&log_entry(3, 8, SyncStatus::Conflict)).unwrap();

    let status = store.device_status("android-1").unwrap().unwrap();
    assert_eq!(status.total_synced, 3);
    assert_eq!(status.pending_conflicts, 1);
    assert_eq!(status.last_sync, Some(ts()));
    assert!(store.device_status("android-2").unwrap().is_none());
}

macro_rules! store_tests {
    ($name:ident, $make:expr) => {
        mod $name {
            use super::*;

            #[test]
            fn partial_update() {
                partial_update_keeps_other_fields(&$make);
            }

            #[test]
            fn missing_entity() {
                missing_entity_errors(&$make);
            }

            #[test]
            fn unique_success() {
                success_is_unique_per_key(&$make);
            }

            #[test]
            fn device_status() {
                device_status_matches(&$make);
            }
        }
    };
}

store_tests!(memory, MemoryStore::new());
store_tests!(sqlite, SqliteStore::open_in_memory().unwrap());

#[test]
fn sqlite_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("campo.sqlite3");

    let id = {
        let store = SqliteStore::open(&path).unwrap();
        store.append_log(&log_entry(1, 1, SyncStatus::Success)).unwrap();
        store
            .transaction(|txn| {
                txn.create(
                    EntityType::Evidence,
                    payload(&[("sha256", json!("abc"))]),
                    ts(),
                    "agente",
                )
            })
            .unwrap()
    };

    let store = SqliteStore::open(&path).unwrap();
    assert!(store.find_success(&key(1)).unwrap());
    let entity = store.get(EntityType::Evidence, id).unwrap().unwrap();
    assert_eq!(entity.fields["sha256"], json!("abc"));
}
