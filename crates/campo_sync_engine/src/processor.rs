//! Batch processing.

use crate::applier::OperationApplier;
use crate::config::EngineConfig;
use crate::detector::detect;
use crate::error::{ApplyError, ApplyResult, SyncError, SyncResult};
use crate::handler::HandlerRegistry;
use crate::resolver::{resolve, Resolution};
use campo_sync_protocol::{
    validate_operations, ConflictRecord, ConflictResolutionStrategy, DeviceSyncStatus, EntityId,
    OperationError, OperationOutcome, OutcomeStatus, SyncBatch, SyncLogEntry, SyncOperation,
    SyncOperationResponse, SyncStatus,
};
use campo_sync_store::{StoreError, SyncStore};
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn};

/// Counters accumulated across batches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    /// Batches that ran to completion.
    pub batches: u64,
    /// Batches aborted by a fatal error.
    pub aborted_batches: u64,
    /// Operations handled in completed batches.
    pub operations: u64,
    /// Operations applied.
    pub applied: u64,
    /// Replays answered from the ledger.
    pub already_processed: u64,
    /// Conflicts settled in the server's favor.
    pub server_wins: u64,
    /// Conflicts left for manual review.
    pub conflicts: u64,
    /// Failed operations.
    pub errors: u64,
    /// Retries after a version conflict.
    pub version_retries: u64,
}

/// How one operation ended.
enum Settled {
    Applied {
        entity_id: EntityId,
        resolution: Option<ConflictResolutionStrategy>,
    },
    Skipped {
        resolution: ConflictResolutionStrategy,
    },
    Conflict(ConflictRecord),
    AlreadyProcessed,
}

/// Runs batches of offline operations against a store.
///
/// Operations are processed strictly in order. Each one runs in its own
/// store transaction covering detection, application and its success log
/// entry, so a failed operation leaves no trace besides its error entry
/// and never affects its neighbours.
///
/// # Example
///
/// ```rust
/// use campo_sync_engine::{BatchProcessor, EngineConfig};
/// use campo_sync_protocol::{EntityType, Payload, SyncOperation};
/// use campo_sync_store::MemoryStore;
/// use chrono::Utc;
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let processor = BatchProcessor::new(Arc::new(MemoryStore::new()), EngineConfig::default());
///
/// let mut data = Payload::new();
/// data.insert("kind".into(), json!("VISITA"));
/// let op = SyncOperation::create(
///     "550e8400-e29b-41d4-a716-446655440000",
///     EntityType::Activity,
///     data,
///     Utc::now(),
/// );
///
/// let response = processor.process_batch(&[op], "android-1", "agente").unwrap();
/// assert_eq!(response.processed, 1);
/// assert!(response.is_clean());
/// ```
pub struct BatchProcessor<S: SyncStore> {
    store: Arc<S>,
    applier: OperationApplier,
    config: EngineConfig,
    stats: RwLock<ProcessorStats>,
}

impl<S: SyncStore> BatchProcessor<S> {
    /// Creates a processor with the default handlers.
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            store,
            applier: OperationApplier::default(),
            config,
            stats: RwLock::new(ProcessorStats::default()),
        }
    }

    /// Replaces the handler registry.
    pub fn with_registry(mut self, registry: HandlerRegistry) -> Self {
        self.applier = OperationApplier::new(registry);
        self
    }

    /// Returns the store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns accumulated counters.
    pub fn stats(&self) -> ProcessorStats {
        self.stats.read().clone()
    }

    /// Processes a decoded batch.
    pub fn process(&self, batch: &SyncBatch, actor: &str) -> SyncResult<SyncOperationResponse> {
        self.run(
            &batch.operations,
            &batch.device_id,
            actor,
            batch.batch_id.as_deref(),
        )
    }

    /// Processes `operations` submitted by `device_id` on behalf of `actor`.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Validation`] if the batch is malformed; nothing is
    ///   processed
    /// - [`SyncError::Ledger`] if the ledger cannot be read or an error
    ///   entry cannot be written; operations committed before the failure
    ///   stay committed
    pub fn process_batch(
        &self,
        operations: &[SyncOperation],
        device_id: &str,
        actor: &str,
    ) -> SyncResult<SyncOperationResponse> {
        self.run(operations, device_id, actor, None)
    }

    /// Aggregates the sync log of `device_id`.
    pub fn device_status(&self, device_id: &str) -> SyncResult<DeviceSyncStatus> {
        self.store
            .device_status(device_id)?
            .ok_or_else(|| SyncError::DeviceNotFound(device_id.to_string()))
    }

    fn run(
        &self,
        operations: &[SyncOperation],
        device_id: &str,
        actor: &str,
        batch_id: Option<&str>,
    ) -> SyncResult<SyncOperationResponse> {
        validate_operations(device_id, operations, self.config.max_batch_operations)?;

        let span = info_span!(
            "sync_batch",
            device_id,
            batch_id = batch_id.unwrap_or("-"),
            operations = operations.len()
        );
        let _enter = span.enter();

        let result = self.run_validated(operations, device_id, actor);
        match &result {
            Ok(response) => {
                info!(
                    successes = response.successes.len(),
                    conflicts = response.conflicts.len(),
                    errors = response.errors.len(),
                    "batch processed"
                );
                self.record_stats(response);
            }
            Err(err) => {
                error!(error = %err, "batch aborted");
                self.stats.write().aborted_batches += 1;
            }
        }
        result
    }

    fn run_validated(
        &self,
        operations: &[SyncOperation],
        device_id: &str,
        actor: &str,
    ) -> SyncResult<SyncOperationResponse> {
        let started = Instant::now();
        let deadline = started + self.config.batch_deadline;
        let mut response = SyncOperationResponse::new(Utc::now());

        for op in operations {
            response.processed += 1;

            if self
                .store
                .find_success(&op.idempotency_key)
                .map_err(SyncError::Ledger)?
            {
                debug!(key = %op.idempotency_key, "already processed");
                response
                    .successes
                    .push(OperationOutcome::new(op, OutcomeStatus::AlreadyProcessed));
                continue;
            }

            if Instant::now() >= deadline {
                let err = ApplyError::DeadlineExceeded(started.elapsed());
                self.record_error(op, device_id, actor, &err, &mut response)?;
                continue;
            }

            match self.settle(op, device_id, actor) {
                Ok(Settled::Applied {
                    entity_id,
                    resolution,
                }) => {
                    let mut outcome = OperationOutcome::new(op, OutcomeStatus::Success)
                        .with_entity_id(Some(entity_id));
                    if let Some(strategy) = resolution {
                        outcome = outcome.with_resolution(strategy);
                    }
                    response.successes.push(outcome);
                }
                Ok(Settled::Skipped { resolution }) => {
                    response.successes.push(
                        OperationOutcome::new(op, OutcomeStatus::ServerWins)
                            .with_resolution(resolution),
                    );
                }
                Ok(Settled::Conflict(conflict)) => {
                    warn!(
                        key = %op.idempotency_key,
                        entity_type = %op.entity_type,
                        conflict_type = %conflict.conflict_type,
                        "conflict needs manual resolution"
                    );
                    response.conflicts.push(conflict);
                }
                Ok(Settled::AlreadyProcessed) => {
                    response
                        .successes
                        .push(OperationOutcome::new(op, OutcomeStatus::AlreadyProcessed));
                }
                Err(err) => self.record_error(op, device_id, actor, &err, &mut response)?,
            }
        }

        response.server_timestamp = Utc::now();
        Ok(response)
    }

    /// Runs one operation, retrying from detection after a version conflict.
    fn settle(&self, op: &SyncOperation, device_id: &str, actor: &str) -> ApplyResult<Settled> {
        let mut retries = 0;
        loop {
            match self.attempt(op, device_id, actor) {
                Err(err) if err.is_version_conflict() && retries < self.config.max_version_retries => {
                    retries += 1;
                    self.stats.write().version_retries += 1;
                    debug!(key = %op.idempotency_key, retries, "version conflict, retrying");
                }
                // Another worker logged the key between our ledger check and commit.
                Err(ApplyError::Store(StoreError::DuplicateIdempotencyKey(_))) => {
                    return Ok(Settled::AlreadyProcessed);
                }
                other => return other,
            }
        }
    }

    fn attempt(&self, op: &SyncOperation, device_id: &str, actor: &str) -> ApplyResult<Settled> {
        let started = Instant::now();
        let budget = self.config.operation_budget;
        let strategy = op.conflict_resolution_strategy;

        self.store.transaction(|txn| {
            let current = match op.entity_id {
                Some(id) => txn.get(op.entity_type, id)?,
                None => None,
            };
            let expected_version = current.as_ref().map(|entity| entity.version);

            let settled = match detect(op, current.as_ref()) {
                None => Settled::Applied {
                    entity_id: self
                        .applier
                        .apply(txn, op, &op.data, actor, expected_version)?,
                    resolution: None,
                },
                Some(conflict) => {
                    debug!(
                        key = %op.idempotency_key,
                        conflict_type = %conflict.conflict_type,
                        %strategy,
                        "conflict detected"
                    );
                    match resolve(&conflict, strategy) {
                        Resolution::Apply(data) => Settled::Applied {
                            entity_id: self
                                .applier
                                .apply(txn, op, &data, actor, expected_version)?,
                            resolution: Some(strategy),
                        },
                        Resolution::Skip => Settled::Skipped {
                            resolution: strategy,
                        },
                        Resolution::Unresolved => Settled::Conflict(conflict),
                    }
                }
            };

            let (status, entity_id) = match &settled {
                Settled::Applied { entity_id, .. } => (SyncStatus::Success, Some(*entity_id)),
                Settled::Conflict(_) => (SyncStatus::Conflict, op.entity_id),
                _ => (SyncStatus::Success, op.entity_id),
            };
            let entry = SyncLogEntry::new(op, device_id, actor, status, Utc::now())
                .with_entity_id(entity_id);
            txn.append_log(&entry)?;

            let elapsed = started.elapsed();
            if elapsed > budget {
                return Err(ApplyError::BudgetExceeded { elapsed, budget });
            }
            Ok(settled)
        })
    }

    fn record_error(
        &self,
        op: &SyncOperation,
        device_id: &str,
        actor: &str,
        err: &ApplyError,
        response: &mut SyncOperationResponse,
    ) -> SyncResult<()> {
        error!(
            key = %op.idempotency_key,
            entity_type = %op.entity_type,
            operation = %op.operation,
            error = %err,
            "operation failed"
        );

        let message = err.to_string();
        let entry = SyncLogEntry::new(op, device_id, actor, SyncStatus::Error, Utc::now())
            .with_error(message.clone());
        self.store.append_log(&entry).map_err(SyncError::Ledger)?;

        response.errors.push(OperationError::new(op, message));
        Ok(())
    }

    fn record_stats(&self, response: &SyncOperationResponse) {
        let mut stats = self.stats.write();
        stats.batches += 1;
        stats.operations += response.processed as u64;
        stats.applied += response.count(OutcomeStatus::Success) as u64;
        stats.already_processed += response.count(OutcomeStatus::AlreadyProcessed) as u64;
        stats.server_wins += response.count(OutcomeStatus::ServerWins) as u64;
        stats.conflicts += response.conflicts.len() as u64;
        stats.errors += response.errors.len() as u64;
    }
}

impl<S: SyncStore> std::fmt::Debug for BatchProcessor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchProcessor")
            .field("applier", &self.applier)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campo_sync_protocol::{ConflictType, EntityType, Payload, Timestamp, ValidationError};
    use campo_sync_store::{Entity, MemoryStore};
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use std::time::Duration as StdDuration;

    fn ts() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 0).unwrap()
    }

    fn key(n: u32) -> String {
        format!("00000000-0000-4000-8000-{n:012}")
    }

    fn payload(value: serde_json::Value) -> Payload {
        match value {
            serde_json::Value::Object(map) => map,
            _ => Payload::new(),
        }
    }

    fn seeded(last_modified: Timestamp) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let mut entity = Entity::new(
            EntityType::Activity,
            EntityId::new(123),
            payload(json!({"kind": "VISITA", "status": "EM_ANDAMENTO", "description": "rotina"})),
            ts() - Duration::days(1),
            "seed",
        );
        entity.last_modified = last_modified;
        store.insert_entity(entity);
        store
    }

    fn processor(store: Arc<MemoryStore>) -> BatchProcessor<MemoryStore> {
        BatchProcessor::new(store, EngineConfig::default())
    }

    #[test]
    fn rejects_invalid_batch() {
        let processor = processor(Arc::new(MemoryStore::new()));
        let err = processor.process_batch(&[], "android-1", "agente").unwrap_err();
        assert!(matches!(err, SyncError::Validation(ValidationError::EmptyBatch)));
        assert!(err.is_client_error());
        assert!(processor.store().log().is_empty());
    }

    #[test]
    fn server_wins_leaves_entity_untouched() {
        let store = seeded(ts() + Duration::hours(1));
        let before = store.get(EntityType::Activity, EntityId::new(123)).unwrap();
        let processor = processor(Arc::clone(&store));

        let op = SyncOperation::update(
            key(1),
            EntityType::Activity,
            EntityId::new(123),
            payload(json!({"status": "CONCLUIDA"})),
            ts(),
        )
        .with_strategy(ConflictResolutionStrategy::ServerWins);

        let response = processor.process_batch(&[op], "android-1", "agente").unwrap();
        assert_eq!(response.successes[0].status, OutcomeStatus::ServerWins);
        assert_eq!(
            response.successes[0].resolution,
            Some(ConflictResolutionStrategy::ServerWins)
        );
        assert_eq!(store.get(EntityType::Activity, EntityId::new(123)).unwrap(), before);

        // The skip is terminal for the key.
        assert!(store.find_success(&key(1)).unwrap());
    }

    #[test]
    fn merge_resolution_annotated() {
        let store = seeded(ts() + Duration::hours(1));
        let processor = processor(Arc::clone(&store));

        let op = SyncOperation::update(
            key(1),
            EntityType::Activity,
            EntityId::new(123),
            payload(json!({"status": "CONCLUIDA", "metadata": {"agente": "Maria"}})),
            ts(),
        )
        .with_strategy(ConflictResolutionStrategy::Merge);

        let response = processor.process_batch(&[op], "android-1", "agente").unwrap();
        assert!(response.is_clean());
        assert_eq!(
            response.successes[0].resolution,
            Some(ConflictResolutionStrategy::Merge)
        );

        let entity = store.get(EntityType::Activity, EntityId::new(123)).unwrap().unwrap();
        assert_eq!(entity.fields["status"], json!("CONCLUIDA"));
        assert_eq!(entity.fields["description"], json!("rotina"));
        assert_eq!(entity.fields["metadata"], json!({"agente": "Maria"}));
    }

    #[test]
    fn manual_conflict_is_logged_not_processed() {
        let store = seeded(ts() + Duration::hours(1));
        let processor = processor(Arc::clone(&store));

        let op = SyncOperation::update(
            key(1),
            EntityType::Activity,
            EntityId::new(123),
            payload(json!({"status": "CONCLUIDA"})),
            ts(),
        );
        let response = processor.process_batch(&[op], "android-1", "agente").unwrap();
        assert_eq!(response.conflicts.len(), 1);
        assert_eq!(response.conflicts[0].conflict_type, ConflictType::UpdateUpdate);
        assert!(!store.find_success(&key(1)).unwrap());

        let log = store.log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].status, SyncStatus::Conflict);

        let status = processor.device_status("android-1").unwrap();
        assert_eq!(status.pending_conflicts, 1);
    }

    #[test]
    fn version_conflicts_are_retried() {
        // A store that reports a stale version on the first write.
        struct Flaky {
            inner: MemoryStore,
            failures: parking_lot::Mutex<u32>,
        }

        impl SyncStore for Flaky {
            fn transaction<R, E, F>(&self, f: F) -> Result<R, E>
            where
                F: FnOnce(&mut dyn campo_sync_store::StoreTransaction) -> Result<R, E>,
                E: From<StoreError>,
            {
                let mut failures = self.failures.lock();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(StoreError::VersionConflict {
                        entity_type: EntityType::Activity,
                        id: EntityId::new(123),
                        expected: 1,
                        actual: 2,
                    }
                    .into());
                }
                drop(failures);
                self.inner.transaction(f)
            }

            fn find_success(&self, key: &str) -> campo_sync_store::StoreResult<bool> {
                self.inner.find_success(key)
            }

            fn append_log(&self, entry: &SyncLogEntry) -> campo_sync_store::StoreResult<()> {
                self.inner.append_log(entry)
            }
        }

        let op = SyncOperation::update(
            key(1),
            EntityType::Activity,
            EntityId::new(123),
            payload(json!({"status": "CONCLUIDA"})),
            ts(),
        );

        let flaky = Flaky {
            inner: MemoryStore::new(),
            failures: parking_lot::Mutex::new(2),
        };
        flaky.inner.insert_entity(Entity::new(
            EntityType::Activity,
            EntityId::new(123),
            payload(json!({"kind": "VISITA"})),
            ts() - Duration::days(1),
            "seed",
        ));
        let processor = BatchProcessor::new(Arc::new(flaky), EngineConfig::default());
        let response = processor
            .process_batch(std::slice::from_ref(&op), "android-1", "agente")
            .unwrap();
        assert!(response.is_clean());
        assert_eq!(processor.stats().version_retries, 2);

        let flaky = Flaky {
            inner: MemoryStore::new(),
            failures: parking_lot::Mutex::new(5),
        };
        let processor = BatchProcessor::new(
            Arc::new(flaky),
            EngineConfig::default().with_max_version_retries(1),
        );
        let response = processor.process_batch(&[op], "android-1", "agente").unwrap();
        assert_eq!(response.errors.len(), 1);
        assert!(response.errors[0].error.contains("changed concurrently"));
    }

    #[test]
    fn deadline_reports_remaining_operations() {
        let store = Arc::new(MemoryStore::new());
        let processor = BatchProcessor::new(
            Arc::clone(&store),
            EngineConfig::default().with_batch_deadline(StdDuration::ZERO),
        );

        let ops: Vec<_> = (1..=3)
            .map(|n| {
                SyncOperation::create(
                    key(n),
                    EntityType::Activity,
                    payload(json!({"kind": "VISITA"})),
                    ts(),
                )
            })
            .collect();
        let response = processor.process_batch(&ops, "android-1", "agente").unwrap();
        assert_eq!(response.processed, 3);
        assert_eq!(response.errors.len(), 3);
        assert!(response.errors[0].error.contains("deadline"));
        assert_eq!(store.entity_count(), 0);
        assert!(store.log().iter().all(|e| e.status == SyncStatus::Error));
    }

    #[test]
    fn budget_rolls_back() {
        let store = Arc::new(MemoryStore::new());
        let processor = BatchProcessor::new(
            Arc::clone(&store),
            EngineConfig::default().with_operation_budget(StdDuration::ZERO),
        );

        let op = SyncOperation::create(
            key(1),
            EntityType::Activity,
            payload(json!({"kind": "VISITA"})),
            ts(),
        );
        let response = processor.process_batch(&[op], "android-1", "agente").unwrap();
        assert_eq!(response.errors.len(), 1);
        assert!(response.errors[0].error.contains("budget"));
        assert_eq!(store.entity_count(), 0);
        assert!(!store.find_success(&key(1)).unwrap());
    }

    #[test]
    fn stats_accumulate() {
        let processor = processor(Arc::new(MemoryStore::new()));
        let op = SyncOperation::create(
            key(1),
            EntityType::Activity,
            payload(json!({"kind": "VISITA"})),
            ts(),
        );
        processor
            .process_batch(std::slice::from_ref(&op), "android-1", "agente")
            .unwrap();
        processor.process_batch(&[op], "android-1", "agente").unwrap();

        let stats = processor.stats();
        assert_eq!(stats.batches, 2);
        assert_eq!(stats.operations, 2);
        assert_eq!(stats.applied, 1);
        assert_eq!(stats.already_processed, 1);
    }

    #[test]
    fn unknown_device() {
        let processor = processor(Arc::new(MemoryStore::new()));
        assert!(matches!(
            processor.device_status("ghost"),
            Err(SyncError::DeviceNotFound(d)) if d == "ghost"
        ));
    }
}
