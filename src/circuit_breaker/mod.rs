// Circuit Breaker Implementation - Project Maester
// "Close the gates before the rot spreads"

#[cfg(test)]
mod tests;

use crate::error::MaesterError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CircuitBreakerState {
    /// Normal operation - requests are allowed through
    Closed,
    /// Failing state - requests are rejected immediately
    Open,
    /// Testing state - requests are allowed to probe if the store recovered
    HalfOpen,
}

impl std::fmt::Display for CircuitBreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures required to open the circuit
    pub failure_threshold: u64,
    /// Number of consecutive successes required to close the circuit from half-open
    pub success_threshold: u64,
    /// Time to wait before transitioning from open to half-open
    pub open_duration: Duration,
    /// Per-operation timeout, reserved until store clients can enforce it
    pub operation_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_duration: Duration::from_secs(60),
            operation_timeout: Duration::from_secs(30),
        }
    }
}

/// Circuit breaker statistics
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub state: CircuitBreakerState,
    /// Consecutive failures since the last success
    pub failure_count: u64,
    /// Consecutive successes while half-open
    pub success_count: u64,
    pub total_requests: u64,
    pub total_failures: u64,
    pub rejected_requests: u64,
    pub state_changes: u64,
    pub last_failure_time: Option<Instant>,
    /// Time remaining until an open circuit allows a probe request
    pub time_until_retry: Option<Duration>,
    pub time_in_current_state: Duration,
}

/// Circuit breaker with consecutive failure tracking
///
/// A single failure-free call fully clears the failure count. The count is
/// consecutive, not windowed, so a store that fails every other request
/// never opens the circuit.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Arc<RwLock<CircuitBreakerState>>,
    failure_count: AtomicU64,
    success_count: AtomicU64,
    total_requests: AtomicU64,
    total_failures: AtomicU64,
    rejected_requests: AtomicU64,
    state_changes: AtomicU64,
    last_failure_time: Arc<Mutex<Option<Instant>>>,
    state_change_time: Arc<Mutex<Instant>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    pub fn new<S: Into<String>>(name: S, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            "🔌 Creating circuit breaker: {} with config: {:?}",
            name, config
        );

        Self {
            name,
            config,
            state: Arc::new(RwLock::new(CircuitBreakerState::Closed)),
            failure_count: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            total_requests: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            rejected_requests: AtomicU64::new(0),
            state_changes: AtomicU64::new(0),
            last_failure_time: Arc::new(Mutex::new(None)),
            state_change_time: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Check if a request can be executed
    pub async fn can_execute(&self) -> bool {
        let state = self.state.read().await;

        match *state {
            CircuitBreakerState::Closed => true,
            CircuitBreakerState::Open => {
                // The retry window is anchored to the moment the circuit
                // opened, not to the last failure
                let opened_at = *self.state_change_time.lock().await;
                if opened_at.elapsed() >= self.config.open_duration {
                    drop(state);
                    self.transition_to_half_open().await;
                    return true;
                }
                false
            }
            CircuitBreakerState::HalfOpen => true,
        }
    }

    /// Execute a request with circuit breaker protection
    pub async fn execute<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        if !self.can_execute().await {
            self.rejected_requests.fetch_add(1, Ordering::Relaxed);
            return Err(CircuitBreakerError::CircuitOpen {
                name: self.name.clone(),
                state: self.get_state().await,
            });
        }

        self.total_requests.fetch_add(1, Ordering::Relaxed);

        match operation.await {
            Ok(result) => {
                self.record_success().await;
                Ok(result)
            }
            Err(error) => {
                self.record_failure().await;
                Err(CircuitBreakerError::OperationFailed { error })
            }
        }
    }

    /// Execute a request, answering with a fallback when the circuit rejects it
    ///
    /// The fallback only covers fast rejection. A request that was allowed
    /// through and then failed still surfaces its own error.
    pub async fn execute_with_fallback<F, G, T, E>(
        &self,
        operation: F,
        fallback: G,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
        G: FnOnce() -> T,
        E: std::fmt::Display,
    {
        match self.execute(operation).await {
            Err(CircuitBreakerError::CircuitOpen { name, state }) => {
                warn!(
                    "🔌 Circuit breaker {} is {} - serving fallback",
                    name, state
                );
                Ok(fallback())
            }
            other => other,
        }
    }

    /// Record a successful request
    pub async fn record_success(&self) {
        let state = self.state.read().await;

        // A success always wipes the consecutive failure streak
        self.failure_count.store(0, Ordering::Relaxed);

        match *state {
            CircuitBreakerState::Closed => {}
            CircuitBreakerState::HalfOpen => {
                let success_count = self.success_count.fetch_add(1, Ordering::Relaxed) + 1;
                if success_count >= self.config.success_threshold {
                    drop(state);
                    self.transition_to_closed().await;
                }
            }
            CircuitBreakerState::Open => {
                // This shouldn't happen, but handle it gracefully
                warn!(
                    "🔌 Recorded success while circuit breaker {} is open",
                    self.name
                );
            }
        }

        debug!("✅ Circuit breaker {} recorded success", self.name);
    }

    /// Record a failed request
    pub async fn record_failure(&self) {
        *self.last_failure_time.lock().await = Some(Instant::now());
        let failure_count = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        self.success_count.store(0, Ordering::Relaxed);

        let state = self.state.read().await;
        match *state {
            CircuitBreakerState::Closed => {
                if failure_count >= self.config.failure_threshold {
                    drop(state);
                    self.transition_to_open().await;
                }
            }
            CircuitBreakerState::HalfOpen => {
                // Any failure in half-open state reopens the circuit
                drop(state);
                self.transition_to_open().await;
            }
            CircuitBreakerState::Open => {
                // Already open, nothing to do
            }
        }

        debug!("❌ Circuit breaker {} recorded failure", self.name);
    }

    /// Get current circuit breaker state
    pub async fn get_state(&self) -> CircuitBreakerState {
        self.state.read().await.clone()
    }

    /// Get comprehensive statistics
    pub async fn get_stats(&self) -> CircuitBreakerStats {
        let state = self.get_state().await;
        let state_change_time = *self.state_change_time.lock().await;

        let time_until_retry = match state {
            CircuitBreakerState::Open => Some(
                self.config
                    .open_duration
                    .saturating_sub(state_change_time.elapsed()),
            ),
            _ => None,
        };

        CircuitBreakerStats {
            state,
            failure_count: self.failure_count.load(Ordering::Relaxed),
            success_count: self.success_count.load(Ordering::Relaxed),
            total_requests: self.total_requests.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            rejected_requests: self.rejected_requests.load(Ordering::Relaxed),
            state_changes: self.state_changes.load(Ordering::Relaxed),
            last_failure_time: *self.last_failure_time.lock().await,
            time_until_retry,
            time_in_current_state: state_change_time.elapsed(),
        }
    }

    /// Reset circuit breaker to initial state
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        *state = CircuitBreakerState::Closed;

        self.failure_count.store(0, Ordering::Relaxed);
        self.success_count.store(0, Ordering::Relaxed);

        *self.last_failure_time.lock().await = None;
        *self.state_change_time.lock().await = Instant::now();

        info!("🔄 Circuit breaker {} reset to closed state", self.name);
    }

    /// Force circuit breaker to open state (for testing/emergency)
    pub async fn force_open(&self) {
        self.transition_to_open().await;
        warn!("🚨 Circuit breaker {} forced to open state", self.name);
    }

    /// Force circuit breaker to closed state (for testing/recovery)
    pub async fn force_close(&self) {
        self.transition_to_closed().await;
        info!("🔧 Circuit breaker {} forced to closed state", self.name);
    }

    /// Transition to closed state
    async fn transition_to_closed(&self) {
        let mut state = self.state.write().await;
        let old_state = state.clone();
        *state = CircuitBreakerState::Closed;

        self.failure_count.store(0, Ordering::Relaxed);
        self.success_count.store(0, Ordering::Relaxed);
        self.state_changes.fetch_add(1, Ordering::Relaxed);
        *self.state_change_time.lock().await = Instant::now();

        info!(
            "✅ Circuit breaker {} transitioned from {} to closed",
            self.name, old_state
        );
    }

    /// Transition to open state
    async fn transition_to_open(&self) {
        let mut state = self.state.write().await;
        let old_state = state.clone();
        *state = CircuitBreakerState::Open;

        self.success_count.store(0, Ordering::Relaxed);
        self.state_changes.fetch_add(1, Ordering::Relaxed);
        *self.state_change_time.lock().await = Instant::now();

        error!(
            "🚨 Circuit breaker {} transitioned from {} to open (retry in {:?})",
            self.name, old_state, self.config.open_duration
        );
    }

    /// Transition to half-open state
    async fn transition_to_half_open(&self) {
        let mut state = self.state.write().await;
        let old_state = state.clone();
        *state = CircuitBreakerState::HalfOpen;

        self.success_count.store(0, Ordering::Relaxed);
        self.state_changes.fetch_add(1, Ordering::Relaxed);
        *self.state_change_time.lock().await = Instant::now();

        info!(
            "🔄 Circuit breaker {} transitioned from {} to half-open",
            self.name, old_state
        );
    }

    /// Get the circuit breaker name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the circuit breaker configuration
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }
}

/// Circuit breaker specific errors
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("Circuit breaker {name} is {state} - request rejected")]
    CircuitOpen {
        name: String,
        state: CircuitBreakerState,
    },

    #[error("Operation failed: {error}")]
    OperationFailed { error: E },
}

impl From<CircuitBreakerError<MaesterError>> for MaesterError {
    fn from(error: CircuitBreakerError<MaesterError>) -> Self {
        match error {
            CircuitBreakerError::CircuitOpen { name, state } => {
                MaesterError::circuit_open(format!("Circuit breaker {name} is {state}"))
            }
            // The wrapped error carries its own classification, pass it
            // through untouched
            CircuitBreakerError::OperationFailed { error } => error,
        }
    }
}

/// Circuit breaker registry for managing multiple circuit breakers
pub struct CircuitBreakerRegistry {
    breakers: Arc<RwLock<std::collections::HashMap<String, Arc<CircuitBreaker>>>>,
}

impl CircuitBreakerRegistry {
    /// Create a new circuit breaker registry
    pub fn new() -> Self {
        Self {
            breakers: Arc::new(RwLock::new(std::collections::HashMap::new())),
        }
    }

    /// Register a circuit breaker
    pub async fn register(&self, breaker: Arc<CircuitBreaker>) {
        let mut breakers = self.breakers.write().await;
        let name = breaker.name().to_string();
        breakers.insert(name.clone(), breaker);
        info!("📋 Registered circuit breaker: {}", name);
    }

    /// Get a circuit breaker by name
    pub async fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        let breakers = self.breakers.read().await;
        breakers.get(name).cloned()
    }

    /// Get or create a circuit breaker with default configuration
    pub async fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.get(name).await {
            return breaker;
        }

        let breaker = Arc::new(CircuitBreaker::new(name, CircuitBreakerConfig::default()));
        self.register(Arc::clone(&breaker)).await;
        breaker
    }

    /// Get or create a circuit breaker with custom configuration
    pub async fn get_or_create_with_config(
        &self,
        name: &str,
        config: CircuitBreakerConfig,
    ) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.get(name).await {
            return breaker;
        }

        let breaker = Arc::new(CircuitBreaker::new(name, config));
        self.register(Arc::clone(&breaker)).await;
        breaker
    }

    /// Get all circuit breaker names
    pub async fn list_names(&self) -> Vec<String> {
        let breakers = self.breakers.read().await;
        breakers.keys().cloned().collect()
    }

    /// Get statistics for all circuit breakers
    pub async fn get_all_stats(&self) -> std::collections::HashMap<String, CircuitBreakerStats> {
        let breakers = self.breakers.read().await;
        let mut stats = std::collections::HashMap::new();

        for (name, breaker) in breakers.iter() {
            stats.insert(name.clone(), breaker.get_stats().await);
        }

        stats
    }

    /// Remove a circuit breaker
    pub async fn remove(&self, name: &str) -> bool {
        let mut breakers = self.breakers.write().await;
        let removed = breakers.remove(name).is_some();
        if removed {
            info!("🗑️ Removed circuit breaker: {}", name);
        }
        removed
    }

    /// Reset all circuit breakers
    pub async fn reset_all(&self) {
        let breakers = self.breakers.read().await;
        for breaker in breakers.values() {
            breaker.reset().await;
        }
        info!("🔄 Reset all circuit breakers");
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
