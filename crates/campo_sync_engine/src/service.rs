//! Async front of the batch processor.

use crate::error::{SyncError, SyncResult};
use crate::processor::BatchProcessor;
use campo_sync_protocol::{DeviceSyncStatus, SyncBatch, SyncOperationResponse};
use campo_sync_store::SyncStore;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Accepts batches from many devices at once.
///
/// Each batch runs on the blocking pool; at most
/// [`EngineConfig::max_concurrent_batches`](crate::EngineConfig) run at
/// the same time and the rest wait for a slot. Batches for the same key
/// are safe to run concurrently: the store accepts one success entry per
/// key and the loser reports `already_processed`.
///
/// # Example
///
/// ```rust
/// use campo_sync_engine::{BatchProcessor, EngineConfig, SyncService};
/// use campo_sync_store::MemoryStore;
/// use std::sync::Arc;
///
/// let processor = BatchProcessor::new(Arc::new(MemoryStore::new()), EngineConfig::default());
/// let service = SyncService::new(processor);
/// assert_eq!(service.available_slots(), 8);
/// ```
pub struct SyncService<S: SyncStore + 'static> {
    processor: Arc<BatchProcessor<S>>,
    slots: Arc<Semaphore>,
}

impl<S: SyncStore + 'static> SyncService<S> {
    /// Wraps `processor`.
    pub fn new(processor: BatchProcessor<S>) -> Self {
        let slots = Arc::new(Semaphore::new(processor.config().max_concurrent_batches));
        Self {
            processor: Arc::new(processor),
            slots,
        }
    }

    /// Returns the processor.
    pub fn processor(&self) -> &Arc<BatchProcessor<S>> {
        &self.processor
    }

    /// Returns the number of idle batch slots.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Processes `batch` on behalf of `actor`.
    ///
    /// # Errors
    ///
    /// Everything [`BatchProcessor::process`] returns, plus
    /// [`SyncError::ShuttingDown`] after [`shutdown`](Self::shutdown) and
    /// [`SyncError::Worker`] if the worker panicked.
    pub async fn submit(
        &self,
        batch: SyncBatch,
        actor: impl Into<String>,
    ) -> SyncResult<SyncOperationResponse> {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| SyncError::ShuttingDown)?;

        let processor = Arc::clone(&self.processor);
        let actor = actor.into();
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            processor.process(&batch, &actor)
        })
        .await
        .map_err(|e| SyncError::Worker(e.to_string()))?
    }

    /// Aggregates the sync log of `device_id`.
    pub async fn device_status(&self, device_id: impl Into<String>) -> SyncResult<DeviceSyncStatus> {
        let processor = Arc::clone(&self.processor);
        let device_id = device_id.into();
        tokio::task::spawn_blocking(move || processor.device_status(&device_id))
            .await
            .map_err(|e| SyncError::Worker(e.to_string()))?
    }

    /// Stops accepting batches. Batches already running finish.
    pub fn shutdown(&self) {
        self.slots.close();
    }

    /// Returns true after [`shutdown`](Self::shutdown).
    pub fn is_shut_down(&self) -> bool {
        self.slots.is_closed()
    }
}

impl<S: SyncStore + 'static> Clone for SyncService<S> {
    fn clone(&self) -> Self {
        Self {
            processor: Arc::clone(&self.processor),
            slots: Arc::clone(&self.slots),
        }
    }
}
