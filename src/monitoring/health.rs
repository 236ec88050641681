// Health Monitor - Project Maester
// "Three keeps watched from a single tower"

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::circuit_breaker::{CircuitBreakerRegistry, CircuitBreakerStats};
use crate::store::{AdapterStatus, StoreAdapter, StoreHealth, StoreId};
use crate::sync::RetryQueue;

/// Aggregate status across all three stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Down,
}

/// Availability of one logical service derived from its store dependencies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Available,
    Degraded,
    Unavailable,
}

/// Which stores each logical service needs to answer requests
///
/// Single-store services are simply available or unavailable. The split
/// entities (teachers, courses) keep limping along on one store.
const SERVICE_DEPENDENCIES: &[(&str, &[StoreId])] = &[
    ("auth", &[StoreId::Auth]),
    ("students", &[StoreId::Academic]),
    ("careers", &[StoreId::Academic]),
    ("cycles", &[StoreId::Academic]),
    ("specialties", &[StoreId::Profiles]),
    ("teachers", &[StoreId::Academic, StoreId::Profiles]),
    ("courses", &[StoreId::Academic, StoreId::Profiles]),
];

/// One full probe of the system, the unit served to operators
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: OverallStatus,
    pub timestamp: i64,
    pub uptime_seconds: u64,
    pub version: String,
    pub stores: HashMap<String, StoreHealth>,
    pub services: HashMap<String, ServiceStatus>,
}

/// Serializable projection of one breaker's statistics
#[derive(Debug, Clone, Serialize)]
pub struct BreakerReport {
    pub state: String,
    pub failure_count: u64,
    pub success_count: u64,
    pub total_requests: u64,
    pub total_failures: u64,
    pub rejected_requests: u64,
    pub state_changes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_until_retry_ms: Option<u64>,
    pub time_in_current_state_ms: u64,
}

impl From<CircuitBreakerStats> for BreakerReport {
    fn from(stats: CircuitBreakerStats) -> Self {
        Self {
            state: stats.state.to_string(),
            failure_count: stats.failure_count,
            success_count: stats.success_count,
            total_requests: stats.total_requests,
            total_failures: stats.total_failures,
            rejected_requests: stats.rejected_requests,
            state_changes: stats.state_changes,
            time_until_retry_ms: stats.time_until_retry.map(|d| d.as_millis() as u64),
            time_in_current_state_ms: stats.time_in_current_state.as_millis() as u64,
        }
    }
}

/// Connection state merged with a fresh probe for one store
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseReport {
    #[serde(flatten)]
    pub status: AdapterStatus,
    pub health: StoreHealth,
}

#[derive(Debug, Clone)]
pub struct HealthMonitorConfig {
    pub probe_interval: Duration,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(30),
        }
    }
}

/// Periodic and on-demand health aggregation over the three store adapters
///
/// Probes run concurrently, per-store transitions are logged as discrete
/// events and the latest snapshot is cached for cheap reads.
pub struct HealthMonitor {
    auth: StoreAdapter,
    academic: StoreAdapter,
    profiles: StoreAdapter,
    config: HealthMonitorConfig,
    start_time: Instant,
    last_snapshot: Arc<RwLock<Option<HealthSnapshot>>>,
    known_health: Arc<RwLock<HashMap<StoreId, bool>>>,
    probe_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    running: Arc<AtomicBool>,
}

impl HealthMonitor {
    pub fn new(
        auth: StoreAdapter,
        academic: StoreAdapter,
        profiles: StoreAdapter,
        config: HealthMonitorConfig,
    ) -> Self {
        Self {
            auth,
            academic,
            profiles,
            config,
            start_time: Instant::now(),
            last_snapshot: Arc::new(RwLock::new(None)),
            known_health: Arc::new(RwLock::new(HashMap::new())),
            probe_task: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    fn adapters(&self) -> [&StoreAdapter; 3] {
        [&self.auth, &self.academic, &self.profiles]
    }

    /// Probe all three stores now and refresh the cached snapshot
    pub async fn check_now(&self) -> HealthSnapshot {
        let (auth_health, academic_health, profiles_health) = tokio::join!(
            self.auth.health_check(),
            self.academic.health_check(),
            self.profiles.health_check(),
        );

        let probes = [
            (StoreId::Auth, auth_health),
            (StoreId::Academic, academic_health),
            (StoreId::Profiles, profiles_health),
        ];

        self.log_transitions(&probes).await;

        let healthy_by_store: HashMap<StoreId, bool> = probes
            .iter()
            .map(|(store, health)| (*store, health.healthy))
            .collect();
        let healthy_count = healthy_by_store.values().filter(|h| **h).count();

        let status = match healthy_count {
            3 => OverallStatus::Healthy,
            0 => OverallStatus::Down,
            _ => OverallStatus::Degraded,
        };

        let services = SERVICE_DEPENDENCIES
            .iter()
            .map(|(name, dependencies)| {
                (
                    name.to_string(),
                    derive_service_status(dependencies, &healthy_by_store),
                )
            })
            .collect();

        let snapshot = HealthSnapshot {
            status,
            timestamp: chrono::Utc::now().timestamp_millis(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            stores: probes
                .into_iter()
                .map(|(store, health)| (store.to_string(), health))
                .collect(),
            services,
        };

        *self.last_snapshot.write().await = Some(snapshot.clone());
        snapshot
    }

    /// Last cached snapshot, probing only when none exists yet
    pub async fn get_health(&self) -> HealthSnapshot {
        if let Some(snapshot) = self.last_snapshot.read().await.clone() {
            return snapshot;
        }
        self.check_now().await
    }

    pub async fn last_snapshot(&self) -> Option<HealthSnapshot> {
        self.last_snapshot.read().await.clone()
    }

    async fn log_transitions(&self, probes: &[(StoreId, StoreHealth)]) {
        let mut known = self.known_health.write().await;
        for (store, health) in probes {
            let previous = known.insert(*store, health.healthy);
            if previous == Some(health.healthy) {
                continue;
            }

            if health.healthy {
                info!(
                    "📡 {} store is healthy ({}ms)",
                    store, health.response_time_ms
                );
            } else {
                error!(
                    "💔 {} store is unhealthy: {}",
                    store,
                    health.error.as_deref().unwrap_or("no response")
                );
            }
        }
    }

    /// Fresh per-store probe merged with adapter and breaker state
    pub async fn database_reports(&self) -> HashMap<String, DatabaseReport> {
        let mut reports = HashMap::new();
        for adapter in self.adapters() {
            let health = adapter.health_check().await;
            let status = adapter.status().await;
            reports.insert(adapter.store().to_string(), DatabaseReport { status, health });
        }
        reports
    }

    /// Per-store breaker statistics straight from the adapters
    pub async fn circuit_breaker_status(&self) -> HashMap<String, BreakerReport> {
        let mut stats = HashMap::new();
        for adapter in self.adapters() {
            stats.insert(
                adapter.store().to_string(),
                adapter.circuit_breaker().get_stats().await.into(),
            );
        }
        stats
    }

    /// Reset every store breaker and its reconnect counter
    pub async fn reset_all_circuit_breakers(&self) {
        info!("🔧 Resetting all circuit breakers");
        for adapter in self.adapters() {
            adapter.reset_circuit_breaker().await;
        }
    }

    /// Start the periodic probe loop
    pub async fn start(&self) {
        if self
            .running
            .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return;
        }

        let monitor = self.clone();
        let handle = tokio::spawn(async move {
            monitor.probe_loop().await;
        });
        *self.probe_task.lock().await = Some(handle);

        info!(
            "⚕ Health monitoring started (interval: {:?})",
            self.config.probe_interval
        );
    }

    /// Stop and cancel the probe loop
    pub async fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.probe_task.lock().await.take() {
            handle.abort();
        }
        info!("🛑 Health monitoring stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    async fn probe_loop(&self) {
        let mut interval = tokio::time::interval(self.config.probe_interval);

        while self.running.load(Ordering::Relaxed) {
            interval.tick().await;

            let snapshot = self.check_now().await;
            debug!(
                "⚕ Probe complete: {:?} ({} services tracked)",
                snapshot.status,
                snapshot.services.len()
            );
        }
    }
}

impl Clone for HealthMonitor {
    fn clone(&self) -> Self {
        Self {
            auth: self.auth.clone(),
            academic: self.academic.clone(),
            profiles: self.profiles.clone(),
            config: self.config.clone(),
            start_time: self.start_time,
            last_snapshot: Arc::clone(&self.last_snapshot),
            known_health: Arc::clone(&self.known_health),
            probe_task: Arc::clone(&self.probe_task),
            running: Arc::clone(&self.running),
        }
    }
}

fn derive_service_status(
    dependencies: &[StoreId],
    healthy_by_store: &HashMap<StoreId, bool>,
) -> ServiceStatus {
    let healthy = dependencies
        .iter()
        .filter(|store| healthy_by_store.get(store).copied().unwrap_or(false))
        .count();

    if healthy == dependencies.len() {
        ServiceStatus::Available
    } else if healthy == 0 {
        ServiceStatus::Unavailable
    } else {
        ServiceStatus::Degraded
    }
}

/// Shared state behind the operator endpoints
pub struct HealthRouterState {
    pub monitor: Arc<HealthMonitor>,
    pub registry: Arc<CircuitBreakerRegistry>,
    pub queue: RetryQueue,
}

pub fn health_router(state: Arc<HealthRouterState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/health/databases", get(databases_handler))
        .route("/health/circuit-breakers", get(circuit_breakers_handler))
        .route(
            "/health/circuit-breakers/reset",
            post(reset_circuit_breakers_handler),
        )
        .route("/health/sync-queue", get(sync_queue_handler))
        .route(
            "/health/sync-queue/{id}/retry",
            post(retry_sync_operation_handler),
        )
        .with_state(state)
}

/// Bind the monitoring port and serve the operator endpoints
///
/// Returns the bound address (useful when asking for port 0) and the
/// handle of the serving task.
pub async fn serve_health_endpoints(
    state: Arc<HealthRouterState>,
    port: u16,
) -> Result<(SocketAddr, JoinHandle<()>)> {
    let app = health_router(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind monitoring server to {addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("Failed to read monitoring server address")?;

    info!("⚕ Monitoring endpoints available on {}", local_addr);

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("⚕ Monitoring server error: {}", e);
        }
    });

    Ok((local_addr, handle))
}

async fn health_handler(
    State(state): State<Arc<HealthRouterState>>,
) -> (StatusCode, Json<HealthSnapshot>) {
    let snapshot = state.monitor.check_now().await;

    let status_code = match snapshot.status {
        OverallStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };

    (status_code, Json(snapshot))
}

async fn databases_handler(
    State(state): State<Arc<HealthRouterState>>,
) -> Json<HashMap<String, DatabaseReport>> {
    Json(state.monitor.database_reports().await)
}

async fn circuit_breakers_handler(
    State(state): State<Arc<HealthRouterState>>,
) -> Json<HashMap<String, BreakerReport>> {
    let mut reports: HashMap<String, BreakerReport> = state
        .registry
        .get_all_stats()
        .await
        .into_iter()
        .map(|(name, stats)| (name, stats.into()))
        .collect();

    // Adapters cover breakers that were never registered
    for (name, report) in state.monitor.circuit_breaker_status().await {
        reports.entry(name).or_insert(report);
    }

    Json(reports)
}

async fn reset_circuit_breakers_handler(
    State(state): State<Arc<HealthRouterState>>,
) -> Json<Value> {
    state.monitor.reset_all_circuit_breakers().await;
    Json(json!({
        "status": "ok",
        "message": "All circuit breakers reset",
    }))
}

async fn sync_queue_handler(
    State(state): State<Arc<HealthRouterState>>,
) -> Json<crate::sync::RetryQueueStats> {
    Json(state.queue.get_statistics().await)
}

async fn retry_sync_operation_handler(
    State(state): State<Arc<HealthRouterState>>,
    Path(operation_id): Path<String>,
) -> Result<Json<Value>, (StatusCode, String)> {
    match state.queue.retry_operation(&operation_id).await {
        Ok(()) => Ok(Json(json!({
            "status": "ok",
            "operation_id": operation_id,
        }))),
        Err(error) => Err((StatusCode::from(&error), error.to_string())),
    }
}
