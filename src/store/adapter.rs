// Store Adapter - Project Maester
// "The gatekeeper decides when the gate may open"

use super::{StoreClient, StoreId};
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::error::{MaesterError, MaesterResult};
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Reconnect behavior for a store adapter
#[derive(Debug, Clone)]
pub struct StoreAdapterConfig {
    pub max_reconnect_attempts: u64,
    pub reconnect_base_delay: Duration,
    pub reconnect_max_delay: Duration,
}

impl Default for StoreAdapterConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 5,
            reconnect_base_delay: Duration::from_millis(1000),
            reconnect_max_delay: Duration::from_millis(30000),
        }
    }
}

/// Outcome of a single health probe against one store
#[derive(Debug, Clone, Serialize)]
pub struct StoreHealth {
    pub healthy: bool,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Connection and breaker state of one adapter, merged for operators
#[derive(Debug, Clone, Serialize)]
pub struct AdapterStatus {
    pub store: StoreId,
    pub connected: bool,
    pub reconnect_attempts: u64,
    pub breaker_state: String,
    pub failure_count: u64,
    pub success_count: u64,
    pub rejected_requests: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_until_retry_ms: Option<u64>,
}

/// Resilient front for one data store
///
/// Every record operation is routed through the store's circuit breaker.
/// Connection-class failures flip the adapter to disconnected and start a
/// backoff-driven reconnect task; a later successful operation flips it back
/// and clears the attempt counter.
#[derive(Clone)]
pub struct StoreAdapter {
    store: StoreId,
    client: Arc<dyn StoreClient>,
    circuit_breaker: Arc<CircuitBreaker>,
    config: StoreAdapterConfig,
    connected: Arc<AtomicBool>,
    reconnect_attempts: Arc<AtomicU64>,
    reconnect_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    shutting_down: Arc<AtomicBool>,
}

impl StoreAdapter {
    pub fn new(store: StoreId, client: Arc<dyn StoreClient>) -> Self {
        Self::with_config(
            store,
            client,
            StoreAdapterConfig::default(),
            CircuitBreakerConfig::default(),
        )
    }

    pub fn with_config(
        store: StoreId,
        client: Arc<dyn StoreClient>,
        config: StoreAdapterConfig,
        breaker_config: CircuitBreakerConfig,
    ) -> Self {
        let circuit_breaker = Arc::new(CircuitBreaker::new(store.as_str(), breaker_config));

        Self {
            store,
            client,
            circuit_breaker,
            config,
            connected: Arc::new(AtomicBool::new(false)),
            reconnect_attempts: Arc::new(AtomicU64::new(0)),
            reconnect_task: Arc::new(Mutex::new(None)),
            shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn store(&self) -> StoreId {
        self.store
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    pub fn circuit_breaker(&self) -> Arc<CircuitBreaker> {
        Arc::clone(&self.circuit_breaker)
    }

    /// Connect to the store, scheduling background reconnects on failure
    ///
    /// A failed initial connect is not fatal to the process; the adapter
    /// keeps trying in the background while requests fail fast.
    pub async fn connect(&self) -> MaesterResult<()> {
        match self.establish().await {
            Ok(()) => Ok(()),
            Err(error) => {
                error!(
                    "❌ Failed to connect to {} store: {}",
                    self.store, error
                );
                self.schedule_reconnect().await;
                Err(error)
            }
        }
    }

    async fn establish(&self) -> MaesterResult<()> {
        info!("🔗 Connecting to {} store...", self.store);

        let result = self
            .circuit_breaker
            .execute(self.client.connect())
            .await
            .map_err(MaesterError::from);

        match result {
            Ok(()) => {
                self.connected.store(true, Ordering::Relaxed);
                self.reconnect_attempts.store(0, Ordering::Relaxed);
                info!("✅ {} store connected", self.store);
                Ok(())
            }
            Err(error) => {
                self.connected.store(false, Ordering::Relaxed);
                Err(error)
            }
        }
    }

    /// Run a record operation through the circuit breaker
    ///
    /// Connection-class errors mark the adapter disconnected and schedule a
    /// reconnect. Breaker rejections do not: the store was never reached.
    pub async fn execute_with_breaker<T>(
        &self,
        label: &str,
        operation: impl Future<Output = MaesterResult<T>>,
    ) -> MaesterResult<T> {
        let result = self
            .circuit_breaker
            .execute(operation)
            .await
            .map_err(MaesterError::from);

        match &result {
            Ok(_) => self.note_success(label),
            Err(error) if error.is_connection_related() => {
                self.note_connection_failure(label).await;
            }
            Err(error) => {
                debug!(
                    "⚠️ {} store {} failed without losing the connection: {}",
                    self.store, label, error
                );
            }
        }

        result
    }

    pub async fn create(&self, collection: &str, record: Value) -> MaesterResult<Value> {
        self.execute_with_breaker("create", self.client.create(collection, record))
            .await
    }

    pub async fn find_by_id(&self, collection: &str, id: i64) -> MaesterResult<Option<Value>> {
        self.execute_with_breaker("find_by_id", self.client.find_by_id(collection, id))
            .await
    }

    pub async fn find_many(
        &self,
        collection: &str,
        filter: Option<&Value>,
    ) -> MaesterResult<Vec<Value>> {
        self.execute_with_breaker("find_many", self.client.find_many(collection, filter))
            .await
    }

    pub async fn update(&self, collection: &str, id: i64, changes: Value) -> MaesterResult<Value> {
        self.execute_with_breaker("update", self.client.update(collection, id, changes))
            .await
    }

    pub async fn delete(&self, collection: &str, id: i64) -> MaesterResult<Value> {
        self.execute_with_breaker("delete", self.client.delete(collection, id))
            .await
    }

    /// Probe the store with a trivial round-trip
    ///
    /// Never fails: probe errors are folded into the result. The probe goes
    /// straight to the client so an open breaker cannot hide a recovered
    /// store from the health monitor.
    pub async fn health_check(&self) -> StoreHealth {
        let started = Instant::now();

        match self.client.ping().await {
            Ok(()) => StoreHealth {
                healthy: true,
                response_time_ms: started.elapsed().as_millis() as u64,
                error: None,
            },
            Err(error) => {
                warn!("💔 Health probe failed for {} store: {}", self.store, error);
                StoreHealth {
                    healthy: false,
                    response_time_ms: started.elapsed().as_millis() as u64,
                    error: Some(error.to_string()),
                }
            }
        }
    }

    /// Merged connection and breaker status for operator endpoints
    pub async fn status(&self) -> AdapterStatus {
        let stats = self.circuit_breaker.get_stats().await;

        AdapterStatus {
            store: self.store,
            connected: self.is_connected(),
            reconnect_attempts: self.reconnect_attempts(),
            breaker_state: stats.state.to_string(),
            failure_count: stats.failure_count,
            success_count: stats.success_count,
            rejected_requests: stats.rejected_requests,
            time_until_retry_ms: stats
                .time_until_retry
                .map(|remaining| remaining.as_millis() as u64),
        }
    }

    /// Administrative reset: close the breaker and clear reconnect state
    pub async fn reset_circuit_breaker(&self) {
        self.circuit_breaker.reset().await;
        self.reconnect_attempts.store(0, Ordering::Relaxed);
        info!("🔄 {} store breaker and reconnect counter reset", self.store);
    }

    fn note_success(&self, label: &str) {
        if !self.connected.swap(true, Ordering::Relaxed) {
            self.reconnect_attempts.store(0, Ordering::Relaxed);
            info!(
                "✅ {} store recovered through successful {}",
                self.store, label
            );
        }
    }

    async fn note_connection_failure(&self, label: &str) {
        if self.connected.swap(false, Ordering::Relaxed) {
            warn!(
                "📡 {} store marked disconnected after failed {}",
                self.store, label
            );
        }
        self.schedule_reconnect().await;
    }

    /// Start the backoff-driven reconnect task unless one is already running
    pub async fn schedule_reconnect(&self) {
        if self.shutting_down.load(Ordering::Relaxed) {
            return;
        }

        let mut slot = self.reconnect_task.lock().await;
        if let Some(handle) = slot.as_ref() {
            if !handle.is_finished() {
                debug!("📡 {} store reconnect already scheduled", self.store);
                return;
            }
        }

        let adapter = self.clone();
        *slot = Some(tokio::spawn(async move {
            adapter.reconnect_loop().await;
        }));
    }

    async fn reconnect_loop(&self) {
        loop {
            let attempts = self.reconnect_attempts.load(Ordering::Relaxed);
            if attempts >= self.config.max_reconnect_attempts {
                error!(
                    "🛑 {} store: max reconnection attempts ({}) reached, giving up",
                    self.store, self.config.max_reconnect_attempts
                );
                return;
            }

            let attempt = self.reconnect_attempts.fetch_add(1, Ordering::Relaxed) + 1;
            let delay = self.reconnect_delay(attempt);
            info!(
                "📡 {} store: reconnect attempt {}/{} in {:?}",
                self.store, attempt, self.config.max_reconnect_attempts, delay
            );

            sleep(delay).await;

            if self.shutting_down.load(Ordering::Relaxed) {
                return;
            }

            match self.establish().await {
                Ok(()) => return,
                Err(error) => {
                    warn!("📡 {} store: reconnect failed: {}", self.store, error);
                }
            }
        }
    }

    /// Exponential backoff capped at the configured maximum
    fn reconnect_delay(&self, attempt: u64) -> Duration {
        let exponent = attempt.min(31) as u32;
        let delay = self
            .config
            .reconnect_base_delay
            .saturating_mul(2u32.saturating_pow(exponent));
        delay.min(self.config.reconnect_max_delay)
    }

    /// Stop background reconnects and release the client connection
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Relaxed);

        let mut slot = self.reconnect_task.lock().await;
        if let Some(handle) = slot.take() {
            handle.abort();
            debug!("🛑 {} store reconnect task stopped", self.store);
        }
        drop(slot);

        if let Err(error) = self.client.disconnect().await {
            warn!(
                "⚠️ {} store disconnect failed during shutdown: {}",
                self.store, error
            );
        }
        self.connected.store(false, Ordering::Relaxed);
        info!("🛑 {} store adapter shut down", self.store);
    }
}
