//! Stored entity state.

use campo_sync_protocol::{EntityId, EntityType, Payload, Timestamp};
use serde::{Deserialize, Serialize};

/// Current server-side state of one activity or evidence record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity type.
    pub entity_type: EntityType,
    /// Server-assigned ID.
    pub id: EntityId,
    /// Domain fields.
    pub fields: Payload,
    /// Actor that created the entity.
    pub created_by: String,
    /// Creation time (the creating operation's client timestamp).
    pub created_at: Timestamp,
    /// Timestamp of the last applied write.
    pub last_modified: Timestamp,
    /// Soft-delete flag. Deleted entities keep their row.
    pub deleted: bool,
    /// Write counter, starts at 1 and grows by one per write.
    pub version: u64,
}

impl Entity {
    /// Creates a fresh, version 1 entity.
    pub fn new(
        entity_type: EntityType,
        id: EntityId,
        fields: Payload,
        created_at: Timestamp,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            entity_type,
            id,
            fields,
            created_by: created_by.into(),
            created_at,
            last_modified: created_at,
            deleted: false,
            version: 1,
        }
    }

    /// Overlays `fields` onto the stored ones and bumps the version.
    ///
    /// Keys absent from `fields` are left untouched.
    pub fn apply_update(&mut self, fields: &Payload, effective_timestamp: Timestamp) {
        for (key, value) in fields {
            self.fields.insert(key.clone(), value.clone());
        }
        self.last_modified = effective_timestamp;
        self.version += 1;
    }

    /// Marks the entity deleted and bumps the version.
    pub fn mark_deleted(&mut self) {
        self.deleted = true;
        self.version += 1;
    }

    /// Returns a field by name.
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn update_touches_only_given_keys() {
        let created = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let mut fields = Payload::new();
        fields.insert("kind".into(), json!("VISITA"));
        fields.insert("status".into(), json!("CRIADA"));

        let mut entity = Entity::new(
            EntityType::Activity,
            EntityId::new(1),
            fields,
            created,
            "agente",
        );
        assert_eq!(entity.version, 1);
        assert_eq!(entity.last_modified, created);

        let mut patch = Payload::new();
        patch.insert("status".into(), json!("CONCLUIDA"));
        let later = created + Duration::hours(2);
        entity.apply_update(&patch, later);

        assert_eq!(entity.field("kind"), Some(&json!("VISITA")));
        assert_eq!(entity.field("status"), Some(&json!("CONCLUIDA")));
        assert_eq!(entity.last_modified, later);
        assert_eq!(entity.created_at, created);
        assert_eq!(entity.version, 2);

        entity.mark_deleted();
        assert!(entity.deleted);
        assert_eq!(entity.version, 3);
    }
}
