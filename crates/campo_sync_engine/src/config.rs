//! Configuration for the sync engine.

use campo_sync_protocol::DEFAULT_MAX_BATCH_OPERATIONS;
use std::time::Duration;

/// Configuration for batch processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum operations accepted in one batch.
    pub max_batch_operations: usize,
    /// Wall-clock budget for a whole batch, checked between operations.
    pub batch_deadline: Duration,
    /// Budget for a single operation's transaction, checked before commit.
    pub operation_budget: Duration,
    /// How many times an operation is retried after a version conflict.
    pub max_version_retries: u32,
    /// Maximum batches the async service runs at once.
    pub max_concurrent_batches: usize,
}

impl EngineConfig {
    /// Creates a configuration with default limits.
    pub fn new() -> Self {
        Self {
            max_batch_operations: DEFAULT_MAX_BATCH_OPERATIONS,
            batch_deadline: Duration::from_secs(30),
            operation_budget: Duration::from_secs(5),
            max_version_retries: 3,
            max_concurrent_batches: 8,
        }
    }

    /// Sets the maximum batch size.
    pub fn with_max_batch_operations(mut self, max: usize) -> Self {
        self.max_batch_operations = max;
        self
    }

    /// Sets the batch deadline.
    pub fn with_batch_deadline(mut self, deadline: Duration) -> Self {
        self.batch_deadline = deadline;
        self
    }

    /// Sets the per-operation budget.
    pub fn with_operation_budget(mut self, budget: Duration) -> Self {
        self.operation_budget = budget;
        self
    }

    /// Sets the number of version-conflict retries.
    pub fn with_max_version_retries(mut self, retries: u32) -> Self {
        self.max_version_retries = retries;
        self
    }

    /// Sets the service concurrency bound. Zero is treated as one.
    pub fn with_max_concurrent_batches(mut self, max: usize) -> Self {
        self.max_concurrent_batches = max.max(1);
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
