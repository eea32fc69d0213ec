//! Conflict records surfaced to clients.

use crate::operation::{EntityId, EntityType, Payload, SyncOperation, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a client operation disagrees with server state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Both client and server modified the entity.
    UpdateUpdate,
    /// Client updated an entity the server no longer has.
    UpdateDelete,
    /// Client deleted an entity the server no longer has or changed.
    DeleteUpdate,
    /// The same ID was created on both sides.
    CreateCreate,
}

impl ConflictType {
    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictType::UpdateUpdate => "update_update",
            ConflictType::UpdateDelete => "update_delete",
            ConflictType::DeleteUpdate => "delete_update",
            ConflictType::CreateCreate => "create_create",
        }
    }

    /// Human-readable advice for resolving this kind of conflict.
    pub fn suggested_resolution(&self) -> &'static str {
        match self {
            ConflictType::UpdateUpdate => {
                "Both versions modified. Review changes and choose MERGE or CLIENT_WINS."
            }
            ConflictType::UpdateDelete => {
                "Client updated but server deleted. Choose CLIENT_WINS to restore or SERVER_WINS to keep deleted."
            }
            ConflictType::DeleteUpdate => {
                "Client deleted but server updated. Choose CLIENT_WINS to delete or SERVER_WINS to keep."
            }
            ConflictType::CreateCreate => "Manual review required.",
        }
    }
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A conflict between a client operation and the server's current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Key of the conflicting operation.
    pub idempotency_key: String,
    /// Entity type.
    pub entity_type: EntityType,
    /// Entity ID.
    pub entity_id: Option<EntityId>,
    /// Conflict classification.
    pub conflict_type: ConflictType,
    /// The operation's client timestamp.
    pub client_version: Timestamp,
    /// The server's last-modified timestamp, if the entity exists.
    pub server_version: Option<Timestamp>,
    /// Data the client tried to write.
    pub client_data: Payload,
    /// Current server snapshot, if the entity exists.
    pub server_data: Option<Payload>,
    /// Advice for a human reviewer.
    pub suggested_resolution: String,
}

impl ConflictRecord {
    /// Creates a conflict for `op` against the given server snapshot.
    pub fn new(
        op: &SyncOperation,
        conflict_type: ConflictType,
        server_version: Option<Timestamp>,
        server_data: Option<Payload>,
    ) -> Self {
        Self {
            idempotency_key: op.idempotency_key.clone(),
            entity_type: op.entity_type,
            entity_id: op.entity_id,
            conflict_type,
            client_version: op.client_timestamp,
            server_version,
            client_data: op.data.clone(),
            server_data,
            suggested_resolution: conflict_type.suggested_resolution().to_string(),
        }
    }

    /// Returns true if the server no longer has the entity.
    pub fn is_missing_on_server(&self) -> bool {
        self.server_version.is_none()
    }

    /// Returns true if the server copy is strictly newer than the client's.
    pub fn server_is_newer(&self) -> bool {
        self.server_version
            .is_some_and(|server| server > self.client_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    fn op() -> SyncOperation {
        let mut data = Payload::new();
        data.insert("status".into(), json!("CONCLUIDA"));
        SyncOperation::update(
            "550e8400-e29b-41d4-a716-446655440000",
            EntityType::Activity,
            EntityId::new(123),
            data,
            Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 0).unwrap(),
        )
    }

    #[test]
    fn suggestion_keyed_off_type() {
        let conflict = ConflictRecord::new(&op(), ConflictType::UpdateDelete, None, None);
        assert_eq!(
            conflict.suggested_resolution,
            ConflictType::UpdateDelete.suggested_resolution()
        );
        assert!(conflict.suggested_resolution.contains("CLIENT_WINS to restore"));
        assert!(conflict.is_missing_on_server());
        assert!(!conflict.server_is_newer());
    }

    #[test]
    fn server_newer() {
        let op = op();
        let later = op.client_timestamp + Duration::seconds(30);
        let conflict = ConflictRecord::new(
            &op,
            ConflictType::UpdateUpdate,
            Some(later),
            Some(Payload::new()),
        );
        assert!(conflict.server_is_newer());
        assert_eq!(conflict.client_data["status"], json!("CONCLUIDA"));
        assert_eq!(conflict.idempotency_key, op.idempotency_key);
    }

    #[test]
    fn wire_shape() {
        let conflict = ConflictRecord::new(&op(), ConflictType::UpdateUpdate, None, None);
        let value = serde_json::to_value(&conflict).unwrap();
        assert_eq!(value["conflict_type"], json!("update_update"));
        assert_eq!(value["entity_type"], json!("activity"));
        assert_eq!(value["entity_id"], json!(123));
        assert_eq!(value["client_version"], json!("2024-01-15T14:30:00Z"));
        assert!(value["server_version"].is_null());
    }
}
