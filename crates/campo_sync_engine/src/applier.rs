//! Operation applier.

use crate::error::{ApplyError, ApplyResult};
use crate::handler::{ApplyContext, HandlerRegistry};
use campo_sync_protocol::{EntityId, OperationKind, Payload, SyncOperation};
use campo_sync_store::StoreTransaction;

/// Executes operations against a store transaction through the handler
/// registered for their entity type.
#[derive(Debug, Default)]
pub struct OperationApplier {
    registry: HandlerRegistry,
}

impl OperationApplier {
    /// Creates an applier over `registry`.
    pub fn new(registry: HandlerRegistry) -> Self {
        Self { registry }
    }

    /// Returns the handler registry.
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Applies `op` with `data` in place of the operation's own payload.
    ///
    /// Returns the affected entity: the new ID for creates, the target for
    /// updates and deletes.
    pub fn apply(
        &self,
        txn: &mut dyn StoreTransaction,
        op: &SyncOperation,
        data: &Payload,
        actor: &str,
        expected_version: Option<u64>,
    ) -> ApplyResult<EntityId> {
        let handler = self.registry.get(op.entity_type)?;
        let ctx = ApplyContext {
            actor,
            client_timestamp: op.client_timestamp,
            expected_version,
        };

        match op.operation {
            OperationKind::Create => handler.create(txn, data, &ctx),
            OperationKind::Update => {
                let id = target(op)?;
                handler.update(txn, id, data, &ctx)?;
                Ok(id)
            }
            OperationKind::Delete => {
                let id = target(op)?;
                handler.delete(txn, id, &ctx)?;
                Ok(id)
            }
        }
    }
}

fn target(op: &SyncOperation) -> ApplyResult<EntityId> {
    op.entity_id
        .ok_or(ApplyError::MissingEntityId(op.operation))
}
