//! Conflict detection.

use campo_sync_protocol::{ConflictRecord, ConflictType, OperationKind, SyncOperation};
use campo_sync_store::Entity;

/// Classifies `op` against the entity's current state.
///
/// - missing entity, update → `update_delete`
/// - missing entity, delete → `delete_update`
/// - entity modified strictly after the client timestamp → `update_update`
///   with the full server snapshot
/// - anything else, including equal timestamps, is not a conflict
///
/// Soft-deleted entities count as present. Creates without an entity ID
/// never conflict.
pub fn detect(op: &SyncOperation, current: Option<&Entity>) -> Option<ConflictRecord> {
    op.entity_id?;

    match current {
        None => match op.operation {
            OperationKind::Update => Some(ConflictRecord::new(
                op,
                ConflictType::UpdateDelete,
                None,
                None,
            )),
            OperationKind::Delete => Some(ConflictRecord::new(
                op,
                ConflictType::DeleteUpdate,
                None,
                None,
            )),
            OperationKind::Create => None,
        },
        Some(entity) if entity.last_modified > op.client_timestamp => Some(ConflictRecord::new(
            op,
            ConflictType::UpdateUpdate,
            Some(entity.last_modified),
            Some(entity.fields.clone()),
        )),
        Some(_) => None,
    }
}
