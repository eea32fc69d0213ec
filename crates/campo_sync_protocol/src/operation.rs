//! Sync operations.

use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// A string-keyed JSON object carried by an operation.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// UTC timestamp used for client and server clocks.
pub type Timestamp = DateTime<Utc>;

/// Server-side identifier of a synchronizable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(i64);

impl EntityId {
    /// Creates an entity ID from its raw value.
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EntityId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

/// The kinds of entity that can be synchronized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A field activity (inspection, treatment, visit).
    Activity,
    /// Evidence attached to an activity (photo, document).
    Evidence,
}

impl EntityType {
    /// All entity types.
    pub const ALL: [EntityType; 2] = [EntityType::Activity, EntityType::Evidence];

    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Activity => "activity",
            EntityType::Evidence => "evidence",
        }
    }

    /// Parses a wire name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type of sync operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Entity was created offline.
    Create,
    /// Entity was modified offline.
    Update,
    /// Entity was deleted offline.
    Delete,
}

impl OperationKind {
    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }

    /// Parses a wire name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "create" => Some(OperationKind::Create),
            "update" => Some(OperationKind::Update),
            "delete" => Some(OperationKind::Delete),
            _ => None,
        }
    }

    /// Returns true if the operation targets an existing entity.
    pub fn requires_entity_id(&self) -> bool {
        matches!(self, OperationKind::Update | OperationKind::Delete)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy the client asks the server to apply when its operation conflicts.
///
/// Serialized in upper case; the lower-case spellings sent by older mobile
/// builds are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConflictResolutionStrategy {
    /// Client data is applied regardless of server state.
    #[serde(rename = "CLIENT_WINS", alias = "client_wins")]
    ClientWins,
    /// Server state is kept; the operation is skipped.
    #[serde(rename = "SERVER_WINS", alias = "server_wins")]
    ServerWins,
    /// The write with the later timestamp is kept.
    #[serde(rename = "LAST_WRITE_WINS", alias = "last_write_wins")]
    LastWriteWins,
    /// Server and client data are deep-merged, client over server.
    #[serde(rename = "MERGE", alias = "merge")]
    Merge,
    /// The conflict is returned for human review.
    #[default]
    #[serde(rename = "MANUAL", alias = "manual")]
    Manual,
}

impl ConflictResolutionStrategy {
    /// Returns true if this strategy resolves conflicts without a human.
    pub fn auto_resolves(&self) -> bool {
        !matches!(self, ConflictResolutionStrategy::Manual)
    }

    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictResolutionStrategy::ClientWins => "CLIENT_WINS",
            ConflictResolutionStrategy::ServerWins => "SERVER_WINS",
            ConflictResolutionStrategy::LastWriteWins => "LAST_WRITE_WINS",
            ConflictResolutionStrategy::Merge => "MERGE",
            ConflictResolutionStrategy::Manual => "MANUAL",
        }
    }
}

impl fmt::Display for ConflictResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mutation recorded on a device while offline.
///
/// # Fields
///
/// - `idempotency_key`: client-generated UUID; replays carry the same key
/// - `entity_type`: activity or evidence
/// - `entity_id`: server ID of the target (absent for creates)
/// - `operation`: create, update or delete
/// - `data`: the fields written by the operation
/// - `client_timestamp`: when the device recorded the change
/// - `conflict_resolution_strategy`: what to do if server state moved on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOperation {
    /// Unique token for this logical intent, a lowercase hyphenated UUID.
    /// Other spellings of a UUID are normalised when decoding.
    #[serde(deserialize_with = "canonical_key")]
    pub idempotency_key: String,
    /// Entity type.
    pub entity_type: EntityType,
    /// Target entity, required for update and delete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<EntityId>,
    /// Operation type.
    pub operation: OperationKind,
    /// Fields written by the operation. `null` decodes as empty.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: Payload,
    /// Device clock when the change was made.
    pub client_timestamp: Timestamp,
    /// Conflict policy for this operation.
    #[serde(default)]
    pub conflict_resolution_strategy: ConflictResolutionStrategy,
}

impl SyncOperation {
    /// Creates a new create operation.
    pub fn create(
        idempotency_key: impl Into<String>,
        entity_type: EntityType,
        data: Payload,
        client_timestamp: Timestamp,
    ) -> Self {
        Self {
            idempotency_key: idempotency_key.into(),
            entity_type,
            entity_id: None,
            operation: OperationKind::Create,
            data,
            client_timestamp,
            conflict_resolution_strategy: ConflictResolutionStrategy::default(),
        }
    }

    /// Creates a new update operation.
    pub fn update(
        idempotency_key: impl Into<String>,
        entity_type: EntityType,
        entity_id: EntityId,
        data: Payload,
        client_timestamp: Timestamp,
    ) -> Self {
        Self {
            idempotency_key: idempotency_key.into(),
            entity_type,
            entity_id: Some(entity_id),
            operation: OperationKind::Update,
            data,
            client_timestamp,
            conflict_resolution_strategy: ConflictResolutionStrategy::default(),
        }
    }

    /// Creates a new delete operation.
    pub fn delete(
        idempotency_key: impl Into<String>,
        entity_type: EntityType,
        entity_id: EntityId,
        client_timestamp: Timestamp,
    ) -> Self {
        Self {
            idempotency_key: idempotency_key.into(),
            entity_type,
            entity_id: Some(entity_id),
            operation: OperationKind::Delete,
            data: Payload::new(),
            client_timestamp,
            conflict_resolution_strategy: ConflictResolutionStrategy::default(),
        }
    }

    /// Sets the conflict resolution strategy.
    pub fn with_strategy(mut self, strategy: ConflictResolutionStrategy) -> Self {
        self.conflict_resolution_strategy = strategy;
        self
    }

    /// Checks the operation in isolation; `index` is its batch position.
    pub fn validate(&self, index: usize) -> Result<(), ValidationError> {
        if canonical_idempotency_key(&self.idempotency_key).as_deref()
            != Some(self.idempotency_key.as_str())
        {
            return Err(ValidationError::InvalidIdempotencyKey {
                index,
                key: self.idempotency_key.clone(),
            });
        }

        if self.operation.requires_entity_id() && self.entity_id.is_none() {
            return Err(ValidationError::MissingEntityId {
                index,
                operation: self.operation,
            });
        }

        Ok(())
    }
}

/// Returns the lowercase hyphenated form of `raw` if it is a UUID.
///
/// The ledger compares keys as strings, so every spelling of one UUID
/// must map to the same key.
pub fn canonical_idempotency_key(raw: &str) -> Option<String> {
    uuid::Uuid::parse_str(raw)
        .ok()
        .map(|uuid| uuid.hyphenated().to_string())
}

fn canonical_key<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let raw = String::deserialize(deserializer)?;
    // Non-UUIDs are kept as sent and rejected by validation.
    Ok(canonical_idempotency_key(&raw).unwrap_or(raw))
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Payload, D::Error> {
    Ok(Option::<Payload>::deserialize(deserializer)?.unwrap_or_default())
}
