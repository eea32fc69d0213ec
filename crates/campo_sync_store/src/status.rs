//! Per-device aggregation over sync log entries.

use campo_sync_protocol::{DeviceSyncStatus, SyncLogEntry, SyncStatus};

/// Aggregates a device's log entries, given in insertion order.
///
/// A conflict entry stays pending until a later success entry from the
/// same device touches the same entity. Returns `None` for an empty log.
pub fn summarize_device(device_id: &str, entries: &[SyncLogEntry]) -> Option<DeviceSyncStatus> {
    if entries.is_empty() {
        return None;
    }

    let total = entries.len() as u64;
    let successes = entries
        .iter()
        .filter(|e| e.status == SyncStatus::Success)
        .count() as u64;
    let last_sync = entries.iter().map(|e| e.server_timestamp).max();

    let pending = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| e.status == SyncStatus::Conflict)
        .filter(|(pos, conflict)| {
            !entries[pos + 1..].iter().any(|later| {
                later.status == SyncStatus::Success
                    && later.entity_type == conflict.entity_type
                    && later.entity_id == conflict.entity_id
            })
        })
        .count() as u64;

    Some(DeviceSyncStatus::from_counts(
        device_id, total, successes, last_sync, pending,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use campo_sync_protocol::{EntityId, EntityType, Payload, SyncOperation, Timestamp};
    use chrono::{Duration, TimeZone, Utc};

    fn entry(n: i64, id: i64, status: SyncStatus) -> SyncLogEntry {
        let ts: Timestamp = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let op = SyncOperation::update(
            format!("00000000-0000-4000-8000-{n:012}"),
            EntityType::Activity,
            EntityId::new(id),
            Payload::new(),
            ts,
        );
        SyncLogEntry::new(&op, "android-1", "agente", status, ts + Duration::minutes(n))
    }

    #[test]
    fn empty_log() {
        assert!(summarize_device("android-1", &[]).is_none());
    }

    #[test]
    fn counts_and_last_sync() {
        let entries = vec![
            entry(1, 10, SyncStatus::Success),
            entry(2, 11, SyncStatus::Error),
            entry(3, 12, SyncStatus::Success),
            entry(4, 13, SyncStatus::Success),
        ];
        let status = summarize_device("android-1", &entries).unwrap();
        assert_eq!(status.total_synced, 4);
        assert!((status.success_rate - 0.75).abs() < f64::EPSILON);
        assert_eq!(status.last_sync, Some(entries[3].server_timestamp));
        assert_eq!(status.pending_conflicts, 0);
    }

    #[test]
    fn conflict_cleared_by_later_success() {
        let entries = vec![
            entry(1, 10, SyncStatus::Conflict),
            entry(2, 11, SyncStatus::Conflict),
            entry(3, 10, SyncStatus::Success),
        ];
        let status = summarize_device("android-1", &entries).unwrap();
        assert_eq!(status.pending_conflicts, 1);
    }

    #[test]
    fn earlier_success_does_not_clear() {
        let entries = vec![
            entry(1, 10, SyncStatus::Success),
            entry(2, 10, SyncStatus::Conflict),
        ];
        let status = summarize_device("android-1", &entries).unwrap();
        assert_eq!(status.pending_conflicts, 1);
    }
}
