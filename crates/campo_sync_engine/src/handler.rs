//! Per-entity-type handlers and their field schemas.

use crate::error::{ApplyError, ApplyResult};
use campo_sync_protocol::{EntityId, EntityType, OperationKind, Payload, Timestamp};
use campo_sync_store::StoreTransaction;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// JSON type accepted for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// A JSON string.
    Text,
    /// A JSON integer that fits in `i64`.
    Integer,
    /// A JSON object.
    Object,
}

impl FieldKind {
    /// Returns true if `value` has this kind.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldKind::Text => value.is_string(),
            FieldKind::Integer => value.is_i64(),
            FieldKind::Object => value.is_object(),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FieldKind::Text => "a string",
            FieldKind::Integer => "an integer",
            FieldKind::Object => "an object",
        })
    }
}

/// Value filled in on create when a field is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDefault {
    /// A fixed string.
    Text(&'static str),
    /// `{}`.
    EmptyObject,
}

impl FieldDefault {
    fn value(&self) -> Value {
        match self {
            FieldDefault::Text(text) => Value::from(*text),
            FieldDefault::EmptyObject => Value::Object(Payload::new()),
        }
    }
}

/// One field of an entity schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name.
    pub name: &'static str,
    /// Accepted JSON type.
    pub kind: FieldKind,
    /// Must be present and non-null on create; may never be null.
    pub required: bool,
    /// Default applied on create.
    pub default: Option<FieldDefault>,
}

impl FieldSpec {
    /// An optional field.
    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            default: None,
        }
    }

    /// A required field.
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
            default: None,
        }
    }

    /// Sets the create-time default.
    pub const fn with_default(mut self, default: FieldDefault) -> Self {
        self.default = Some(default);
        self
    }
}

/// Checks `data` against `schema`.
///
/// Unknown keys and wrongly typed values are rejected for every
/// operation. Required fields must be present on create and can never be
/// set to null. Optional fields accept null.
pub fn validate_payload(
    entity_type: EntityType,
    schema: &[FieldSpec],
    data: &Payload,
    operation: OperationKind,
) -> ApplyResult<()> {
    for (key, value) in data {
        let spec = schema
            .iter()
            .find(|spec| spec.name == key.as_str())
            .ok_or_else(|| ApplyError::UnknownField {
                entity_type,
                field: key.clone(),
            })?;

        let null_ok = value.is_null() && !spec.required;
        if !null_ok && !spec.kind.accepts(value) {
            return Err(ApplyError::InvalidField {
                entity_type,
                field: key.clone(),
                expected: spec.kind,
            });
        }
    }

    if operation == OperationKind::Create {
        if let Some(missing) = schema
            .iter()
            .find(|spec| spec.required && !data.contains_key(spec.name))
        {
            return Err(ApplyError::MissingField {
                entity_type,
                field: missing.name.to_string(),
            });
        }
    }

    Ok(())
}

/// Returns `data` with create-time defaults filled in.
pub fn with_defaults(schema: &[FieldSpec], data: &Payload) -> Payload {
    let mut fields = data.clone();
    for spec in schema {
        if let Some(default) = spec.default {
            fields
                .entry(spec.name)
                .or_insert_with(|| default.value());
        }
    }
    fields
}

/// Inputs shared by every handler call for one operation.
#[derive(Debug, Clone, Copy)]
pub struct ApplyContext<'a> {
    /// User or service the batch runs for.
    pub actor: &'a str,
    /// The operation's client timestamp.
    pub client_timestamp: Timestamp,
    /// Version read during detection, if the entity existed.
    pub expected_version: Option<u64>,
}

/// Create, update and delete for one entity type.
///
/// The provided methods validate against [`EntityHandler::schema`] and
/// write through the store; handlers override them to add domain rules.
pub trait EntityHandler: Send + Sync {
    /// The entity type handled.
    fn entity_type(&self) -> EntityType;

    /// Field schema of the entity.
    fn schema(&self) -> &'static [FieldSpec];

    /// Validates a payload for `operation`.
    fn validate(&self, data: &Payload, operation: OperationKind) -> ApplyResult<()> {
        validate_payload(self.entity_type(), self.schema(), data, operation)
    }

    /// Creates the entity and returns its ID.
    fn create(
        &self,
        txn: &mut dyn StoreTransaction,
        data: &Payload,
        ctx: &ApplyContext<'_>,
    ) -> ApplyResult<EntityId> {
        self.validate(data, OperationKind::Create)?;
        let fields = with_defaults(self.schema(), data);
        Ok(txn.create(self.entity_type(), fields, ctx.client_timestamp, ctx.actor)?)
    }

    /// Updates only the fields present in `data`.
    fn update(
        &self,
        txn: &mut dyn StoreTransaction,
        id: EntityId,
        data: &Payload,
        ctx: &ApplyContext<'_>,
    ) -> ApplyResult<()> {
        self.validate(data, OperationKind::Update)?;
        txn.update(
            self.entity_type(),
            id,
            data,
            ctx.client_timestamp,
            ctx.expected_version,
        )?;
        Ok(())
    }

    /// Soft-deletes the entity.
    fn delete(
        &self,
        txn: &mut dyn StoreTransaction,
        id: EntityId,
        ctx: &ApplyContext<'_>,
    ) -> ApplyResult<()> {
        txn.soft_delete(self.entity_type(), id, ctx.expected_version)?;
        Ok(())
    }
}

const ACTIVITY_SCHEMA: &[FieldSpec] = &[
    FieldSpec::required("kind", FieldKind::Text),
    FieldSpec::optional("status", FieldKind::Text).with_default(FieldDefault::Text("CRIADA")),
    FieldSpec::optional("municipality_code", FieldKind::Integer),
    FieldSpec::optional("description", FieldKind::Text),
    FieldSpec::optional("metadata", FieldKind::Object).with_default(FieldDefault::EmptyObject),
];

const EVIDENCE_SCHEMA: &[FieldSpec] = &[
    FieldSpec::required("activity_id", FieldKind::Integer),
    FieldSpec::required("kind", FieldKind::Text),
    FieldSpec::optional("status", FieldKind::Text).with_default(FieldDefault::Text("PENDENTE")),
    FieldSpec::optional("sha256", FieldKind::Text),
    FieldSpec::optional("size_bytes", FieldKind::Integer),
    FieldSpec::optional("storage_url", FieldKind::Text),
    FieldSpec::optional("upload_id", FieldKind::Text),
    FieldSpec::optional("description", FieldKind::Text),
    FieldSpec::optional("metadata", FieldKind::Object).with_default(FieldDefault::EmptyObject),
];

/// Field activities.
#[derive(Debug, Default, Clone, Copy)]
pub struct ActivityHandler;

impl EntityHandler for ActivityHandler {
    fn entity_type(&self) -> EntityType {
        EntityType::Activity
    }

    fn schema(&self) -> &'static [FieldSpec] {
        ACTIVITY_SCHEMA
    }
}

/// Evidence attached to an activity. `activity_id` must reference an
/// existing activity.
#[derive(Debug, Default, Clone, Copy)]
pub struct EvidenceHandler;

impl EvidenceHandler {
    fn check_activity(txn: &dyn StoreTransaction, data: &Payload) -> ApplyResult<()> {
        let Some(raw) = data.get("activity_id").and_then(Value::as_i64) else {
            return Ok(());
        };
        if txn.get(EntityType::Activity, EntityId::new(raw))?.is_none() {
            return Err(ApplyError::Constraint(format!(
                "evidence references missing activity {raw}"
            )));
        }
        Ok(())
    }
}

impl EntityHandler for EvidenceHandler {
    fn entity_type(&self) -> EntityType {
        EntityType::Evidence
    }

    fn schema(&self) -> &'static [FieldSpec] {
        EVIDENCE_SCHEMA
    }

    fn create(
        &self,
        txn: &mut dyn StoreTransaction,
        data: &Payload,
        ctx: &ApplyContext<'_>,
    ) -> ApplyResult<EntityId> {
        self.validate(data, OperationKind::Create)?;
        Self::check_activity(txn, data)?;
        let fields = with_defaults(self.schema(), data);
        Ok(txn.create(self.entity_type(), fields, ctx.client_timestamp, ctx.actor)?)
    }

    fn update(
        &self,
        txn: &mut dyn StoreTransaction,
        id: EntityId,
        data: &Payload,
        ctx: &ApplyContext<'_>,
    ) -> ApplyResult<()> {
        self.validate(data, OperationKind::Update)?;
        Self::check_activity(txn, data)?;
        txn.update(
            self.entity_type(),
            id,
            data,
            ctx.client_timestamp,
            ctx.expected_version,
        )?;
        Ok(())
    }
}

/// Handlers keyed by entity type.
pub struct HandlerRegistry {
    handlers: HashMap<EntityType, Box<dyn EntityHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Creates a registry with the activity and evidence handlers.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(ActivityHandler);
        registry.register(EvidenceHandler);
        registry
    }

    /// Registers a handler, replacing any previous one for its type.
    pub fn register(&mut self, handler: impl EntityHandler + 'static) {
        self.handlers
            .insert(handler.entity_type(), Box::new(handler));
    }

    /// Looks up the handler for `entity_type`.
    pub fn get(&self, entity_type: EntityType) -> ApplyResult<&dyn EntityHandler> {
        self.handlers
            .get(&entity_type)
            .map(|handler| handler.as_ref())
            .ok_or(ApplyError::UnsupportedEntity(entity_type))
    }

    /// Returns true if a handler is registered for `entity_type`.
    pub fn contains(&self, entity_type: EntityType) -> bool {
        self.handlers.contains_key(&entity_type)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.handlers.keys().collect();
        types.sort();
        f.debug_struct("HandlerRegistry")
            .field("entity_types", &types)
            .finish()
    }
}
