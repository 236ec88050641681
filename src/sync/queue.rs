// Retry Queue - Project Maester
// "What cannot be delivered today waits for the morrow"

use super::{current_timestamp_millis, OperationType, SyncEntity};
use crate::error::{MaesterError, MaesterResult};
use crate::store::StoreId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// A write that succeeded in one store but not its counterpart
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingOperation {
    /// Unique identifier for the operation
    pub id: String,
    /// Kind of write to replay
    pub op_type: OperationType,
    /// Entity the write belongs to
    pub entity: SyncEntity,
    /// Store the replay is aimed at
    pub target_store: StoreId,
    /// Everything the replay needs to reconstruct the write
    pub payload: Value,
    /// Number of replay attempts so far
    pub attempt_count: u32,
    /// Attempt budget before the operation is parked for operators
    pub max_attempts: u32,
    /// Milliseconds since epoch when the operation was queued
    pub created_at: i64,
    /// Milliseconds since epoch of the last attempt (creation counts as one)
    pub last_attempt_at: i64,
    /// Error message from the failure that queued or last failed this operation
    pub last_error: String,
}

impl PendingOperation {
    pub fn new<S: Into<String>>(
        op_type: OperationType,
        entity: SyncEntity,
        target_store: StoreId,
        payload: Value,
        last_error: S,
        max_attempts: u32,
    ) -> Self {
        let now = current_timestamp_millis();

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            op_type,
            entity,
            target_store,
            payload,
            attempt_count: 0,
            max_attempts,
            created_at: now,
            last_attempt_at: now,
            last_error: last_error.into(),
        }
    }

    /// Backoff before the next automatic replay, doubling per attempt
    pub fn backoff_ms(&self) -> i64 {
        let exponent = self.attempt_count.min(31);
        std::cmp::min(1000i64.saturating_mul(1i64 << exponent), 30000)
    }

    /// Check if the operation is due for an automatic replay
    pub fn is_ready_for_retry(&self) -> bool {
        !self.is_exhausted()
            && current_timestamp_millis() - self.last_attempt_at >= self.backoff_ms()
    }

    /// Check if the operation has used up its attempt budget
    pub fn is_exhausted(&self) -> bool {
        self.attempt_count >= self.max_attempts
    }

    /// Record a failed replay attempt
    pub fn record_failed_attempt(&mut self, error_message: String) {
        self.attempt_count += 1;
        self.last_error = error_message;
        self.last_attempt_at = current_timestamp_millis();
    }

    /// Age of the operation in milliseconds
    pub fn age_ms(&self) -> i64 {
        current_timestamp_millis() - self.created_at
    }
}

/// Configuration for the retry queue
#[derive(Debug, Clone)]
pub struct RetryQueueConfig {
    /// Maximum number of operations held at once
    pub max_size: usize,
    /// Interval between automatic replay sweeps
    pub processing_interval: Duration,
    /// Default attempt budget for new operations
    pub default_max_attempts: u32,
}

impl Default for RetryQueueConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            processing_interval: Duration::from_secs(30),
            default_max_attempts: 5,
        }
    }
}

/// Statistics for the retry queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryQueueStats {
    pub total_operations: usize,
    pub ready_for_retry: usize,
    pub exhausted_operations: usize,
    pub total_replays_attempted: u64,
    pub successful_replays: u64,
    pub failed_replays: u64,
    pub operations_by_entity: HashMap<String, usize>,
    pub operations_by_store: HashMap<String, usize>,
    pub operations_by_type: HashMap<String, usize>,
}

#[derive(Debug, Default, Clone)]
struct ReplayCounters {
    attempted: u64,
    successful: u64,
    failed: u64,
}

/// Trait for replaying a queued operation against its target store
#[async_trait::async_trait]
pub trait RetryHandler: Send + Sync {
    /// Attempt to replay a pending operation
    async fn replay(&self, operation: &PendingOperation) -> MaesterResult<()>;

    /// The entity this handler replays operations for
    fn entity(&self) -> SyncEntity;
}

/// In-memory retry queue for half-applied dual writes
///
/// Operations live in a map keyed by operation id for the lifetime of the
/// process; restarts lose them. Exhausted operations stay visible to
/// operators and are only replayed manually.
pub struct RetryQueue {
    config: RetryQueueConfig,
    operations: Arc<Mutex<HashMap<String, PendingOperation>>>,
    counters: Arc<RwLock<ReplayCounters>>,
    handlers: Arc<RwLock<HashMap<SyncEntity, Box<dyn RetryHandler>>>>,
    processing_active: Arc<std::sync::atomic::AtomicBool>,
}

impl RetryQueue {
    pub fn new(config: RetryQueueConfig) -> Self {
        info!(
            "⚬ Initializing retry queue with max size: {}",
            config.max_size
        );

        Self {
            config,
            operations: Arc::new(Mutex::new(HashMap::new())),
            counters: Arc::new(RwLock::new(ReplayCounters::default())),
            handlers: Arc::new(RwLock::new(HashMap::new())),
            processing_active: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    pub fn default_max_attempts(&self) -> u32 {
        self.config.default_max_attempts
    }

    /// Add a pending operation, returning its id
    ///
    /// When the queue is full the oldest retryable operation is evicted with
    /// a warning. Exhausted operations are never evicted; if only those
    /// remain the enqueue is refused.
    pub async fn enqueue(&self, operation: PendingOperation) -> MaesterResult<String> {
        let mut operations = self.operations.lock().await;

        if operations.len() >= self.config.max_size {
            let oldest_retryable = operations
                .values()
                .filter(|op| !op.is_exhausted())
                .min_by_key(|op| op.created_at)
                .map(|op| op.id.clone());

            match oldest_retryable {
                Some(id) => {
                    if let Some(evicted) = operations.remove(&id) {
                        warn!(
                            "⚬ Retry queue full, evicting oldest operation: {} ({} {} -> {}, age: {}ms)",
                            evicted.id,
                            evicted.op_type,
                            evicted.entity,
                            evicted.target_store,
                            evicted.age_ms()
                        );
                    }
                }
                None => {
                    return Err(MaesterError::queue_full(
                        operations.len(),
                        self.config.max_size,
                    ));
                }
            }
        }

        let id = operation.id.clone();
        info!(
            "⚬ Queued {} {} operation {} for {} store (attempt budget: {})",
            operation.op_type, operation.entity, id, operation.target_store, operation.max_attempts
        );
        operations.insert(id.clone(), operation);

        Ok(id)
    }

    /// Register the replay handler for one entity
    pub async fn register_retry_handler(&self, handler: Box<dyn RetryHandler>) {
        let entity = handler.entity();
        let mut handlers = self.handlers.write().await;
        handlers.insert(entity, handler);

        info!("⚬ Registered retry handler for entity: {}", entity);
    }

    /// Start the background replay loop
    pub async fn start_processing(&self) -> MaesterResult<()> {
        if self
            .processing_active
            .compare_exchange(
                false,
                true,
                std::sync::atomic::Ordering::Relaxed,
                std::sync::atomic::Ordering::Relaxed,
            )
            .is_ok()
        {
            let queue = self.clone();
            tokio::spawn(async move {
                queue.processing_loop().await;
            });

            info!("⚬ Retry queue processing started");
        }

        Ok(())
    }

    /// Stop the background replay loop
    pub fn stop_processing(&self) {
        self.processing_active
            .store(false, std::sync::atomic::Ordering::Relaxed);
        info!("⚬ Retry queue processing stopped");
    }

    async fn processing_loop(&self) {
        let mut interval = interval(self.config.processing_interval);

        while self
            .processing_active
            .load(std::sync::atomic::Ordering::Relaxed)
        {
            interval.tick().await;

            if let Err(e) = self.process_pending().await {
                error!("⚬ Error processing retry queue: {}", e);
            }
        }
    }

    /// Replay every operation that is due, oldest first
    pub async fn process_pending(&self) -> MaesterResult<()> {
        let mut operations = self.operations.lock().await;
        let handlers = self.handlers.read().await;

        let mut due: Vec<String> = operations
            .values()
            .filter(|op| op.is_ready_for_retry())
            .map(|op| op.id.clone())
            .collect();
        due.sort_by_key(|id| operations.get(id).map(|op| op.created_at).unwrap_or(0));

        for id in due {
            let Some(operation) = operations.get_mut(&id) else {
                continue;
            };

            let Some(handler) = handlers.get(&operation.entity) else {
                warn!(
                    "⚬ No retry handler registered for entity {} (operation: {})",
                    operation.entity, operation.id
                );
                continue;
            };

            self.counters.write().await.attempted += 1;

            match handler.replay(operation).await {
                Ok(()) => {
                    self.counters.write().await.successful += 1;
                    info!(
                        "✓ Successfully replayed operation: {} ({} {} -> {})",
                        operation.id, operation.op_type, operation.entity, operation.target_store
                    );
                    operations.remove(&id);
                }
                Err(e) => {
                    self.counters.write().await.failed += 1;
                    operation.record_failed_attempt(e.to_string());

                    if operation.is_exhausted() {
                        warn!(
                            "⚬ Operation {} exhausted after {} attempts, parked for operators ({} {} -> {})",
                            operation.id,
                            operation.attempt_count,
                            operation.op_type,
                            operation.entity,
                            operation.target_store
                        );
                    } else {
                        debug!(
                            "⟲ Will replay operation {} in {}ms (attempt {}/{})",
                            operation.id,
                            operation.backoff_ms(),
                            operation.attempt_count + 1,
                            operation.max_attempts
                        );
                    }
                }
            }
        }

        Ok(())
    }

    /// Remove an operation after its write has been applied
    pub async fn complete(&self, operation_id: &str) -> bool {
        let removed = self.operations.lock().await.remove(operation_id).is_some();
        if removed {
            debug!("✓ Completed operation: {}", operation_id);
        }
        removed
    }

    /// Record a failed attempt against an operation
    pub async fn mark_failed(&self, operation_id: &str, error_message: &str) -> MaesterResult<()> {
        let mut operations = self.operations.lock().await;
        let Some(operation) = operations.get_mut(operation_id) else {
            crate::maester_bail!(MaesterError::sync_processing(format!(
                "Operation not found: {operation_id}"
            )));
        };

        operation.record_failed_attempt(error_message.to_string());
        Ok(())
    }

    /// Manually replay one operation, ignoring backoff and exhaustion
    pub async fn retry_operation(&self, operation_id: &str) -> MaesterResult<()> {
        let mut operations = self.operations.lock().await;
        let handlers = self.handlers.read().await;

        let Some(operation) = operations.get_mut(operation_id) else {
            crate::maester_bail!(MaesterError::sync_processing(format!(
                "Operation not found: {operation_id}"
            )));
        };

        let Some(handler) = handlers.get(&operation.entity) else {
            crate::maester_bail!(MaesterError::sync_processing(format!(
                "No retry handler registered for entity {} (operation: {})",
                operation.entity, operation_id
            )));
        };

        self.counters.write().await.attempted += 1;

        match handler.replay(operation).await {
            Ok(()) => {
                self.counters.write().await.successful += 1;
                operations.remove(operation_id);
                info!("✓ Manually replayed operation: {}", operation_id);
                Ok(())
            }
            Err(e) => {
                self.counters.write().await.failed += 1;
                operation.record_failed_attempt(e.to_string());
                crate::maester_bail!(MaesterError::sync_processing(format!(
                    "Manual replay failed for operation {operation_id}: {e}"
                )));
            }
        }
    }

    /// All pending operations, oldest first
    pub async fn list_pending(&self) -> Vec<PendingOperation> {
        let operations = self.operations.lock().await;
        let mut pending: Vec<PendingOperation> = operations.values().cloned().collect();
        pending.sort_by_key(|op| op.created_at);
        pending
    }

    /// Pending operations for one entity, oldest first
    pub async fn list_pending_for_entity(&self, entity: SyncEntity) -> Vec<PendingOperation> {
        let operations = self.operations.lock().await;
        let mut pending: Vec<PendingOperation> = operations
            .values()
            .filter(|op| op.entity == entity)
            .cloned()
            .collect();
        pending.sort_by_key(|op| op.created_at);
        pending
    }

    /// Fetch one operation by id
    pub async fn get_operation(&self, operation_id: &str) -> Option<PendingOperation> {
        self.operations.lock().await.get(operation_id).cloned()
    }

    /// Drop an operation without replaying it (operator action)
    pub async fn remove_operation(&self, operation_id: &str) -> bool {
        let removed = self.operations.lock().await.remove(operation_id).is_some();
        if removed {
            warn!("⚬ Operator removed operation: {}", operation_id);
        }
        removed
    }

    /// Clear all operations (for testing/emergency situations)
    pub async fn clear_all(&self) -> usize {
        let mut operations = self.operations.lock().await;
        let count = operations.len();
        operations.clear();

        warn!("⚬ Cleared all {} pending operations", count);
        count
    }

    /// Current queue statistics
    pub async fn get_statistics(&self) -> RetryQueueStats {
        let operations = self.operations.lock().await;
        let counters = self.counters.read().await.clone();

        let mut by_entity: HashMap<String, usize> = HashMap::new();
        let mut by_store: HashMap<String, usize> = HashMap::new();
        let mut by_type: HashMap<String, usize> = HashMap::new();

        for operation in operations.values() {
            *by_entity.entry(operation.entity.to_string()).or_insert(0) += 1;
            *by_store
                .entry(operation.target_store.to_string())
                .or_insert(0) += 1;
            *by_type.entry(operation.op_type.to_string()).or_insert(0) += 1;
        }

        RetryQueueStats {
            total_operations: operations.len(),
            ready_for_retry: operations
                .values()
                .filter(|op| op.is_ready_for_retry())
                .count(),
            exhausted_operations: operations.values().filter(|op| op.is_exhausted()).count(),
            total_replays_attempted: counters.attempted,
            successful_replays: counters.successful,
            failed_replays: counters.failed,
            operations_by_entity: by_entity,
            operations_by_store: by_store,
            operations_by_type: by_type,
        }
    }
}

impl Clone for RetryQueue {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            operations: Arc::clone(&self.operations),
            counters: Arc::clone(&self.counters),
            handlers: Arc::clone(&self.handlers),
            processing_active: Arc::clone(&self.processing_active),
        }
    }
}
