// Shared fixtures for integration tests

use academic_records_sync_server::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerRegistry};
use academic_records_sync_server::monitoring::{
    HealthMonitor, HealthMonitorConfig, HealthRouterState,
};
use academic_records_sync_server::store::{
    MemoryStoreClient, StoreAdapter, StoreAdapterConfig, StoreId,
};
use academic_records_sync_server::sync::{
    CourseRetryHandler, CourseSyncService, RetryQueue, RetryQueueConfig, TeacherRetryHandler,
    TeacherSyncService,
};
use std::sync::Arc;
use std::time::Duration;

/// Everything a test needs to drive the full synchronization stack
pub struct TestStack {
    pub auth: Arc<MemoryStoreClient>,
    pub academic: Arc<MemoryStoreClient>,
    pub profiles: Arc<MemoryStoreClient>,
    pub auth_adapter: StoreAdapter,
    pub academic_adapter: StoreAdapter,
    pub profiles_adapter: StoreAdapter,
    pub queue: RetryQueue,
    pub teachers: TeacherSyncService,
    pub courses: CourseSyncService,
}

/// Adapter with fast, bounded reconnection so failure tests stay quick
pub fn quiet_adapter(store: StoreId, client: Arc<MemoryStoreClient>) -> StoreAdapter {
    StoreAdapter::with_config(
        store,
        client,
        StoreAdapterConfig {
            max_reconnect_attempts: 2,
            reconnect_base_delay: Duration::from_millis(5),
            reconnect_max_delay: Duration::from_millis(20),
        },
        CircuitBreakerConfig::default(),
    )
}

pub async fn test_stack() -> TestStack {
    let auth = Arc::new(MemoryStoreClient::new("auth"));
    let academic = Arc::new(MemoryStoreClient::new("academic"));
    let profiles = Arc::new(MemoryStoreClient::new("profiles"));

    let auth_adapter = quiet_adapter(StoreId::Auth, Arc::clone(&auth));
    let academic_adapter = quiet_adapter(StoreId::Academic, Arc::clone(&academic));
    let profiles_adapter = quiet_adapter(StoreId::Profiles, Arc::clone(&profiles));

    for adapter in [&auth_adapter, &academic_adapter, &profiles_adapter] {
        adapter.connect().await.expect("memory store connects");
    }

    let queue = RetryQueue::new(RetryQueueConfig {
        max_size: 100,
        processing_interval: Duration::from_millis(50),
        default_max_attempts: 5,
    });
    queue
        .register_retry_handler(Box::new(TeacherRetryHandler::new(
            profiles_adapter.clone(),
            academic_adapter.clone(),
        )))
        .await;
    queue
        .register_retry_handler(Box::new(CourseRetryHandler::new(
            academic_adapter.clone(),
            profiles_adapter.clone(),
        )))
        .await;

    let teachers = TeacherSyncService::new(
        profiles_adapter.clone(),
        academic_adapter.clone(),
        queue.clone(),
    );
    let courses = CourseSyncService::new(
        academic_adapter.clone(),
        profiles_adapter.clone(),
        queue.clone(),
    );

    TestStack {
        auth,
        academic,
        profiles,
        auth_adapter,
        academic_adapter,
        profiles_adapter,
        queue,
        teachers,
        courses,
    }
}

/// Monitor, breaker registry, and queue wired into the HTTP router state
pub async fn router_state(stack: &TestStack) -> Arc<HealthRouterState> {
    let monitor = Arc::new(HealthMonitor::new(
        stack.auth_adapter.clone(),
        stack.academic_adapter.clone(),
        stack.profiles_adapter.clone(),
        HealthMonitorConfig {
            probe_interval: Duration::from_millis(50),
        },
    ));

    let registry = Arc::new(CircuitBreakerRegistry::new());
    for adapter in [
        &stack.auth_adapter,
        &stack.academic_adapter,
        &stack.profiles_adapter,
    ] {
        registry.register(adapter.circuit_breaker()).await;
    }

    Arc::new(HealthRouterState {
        monitor,
        registry,
        queue: stack.queue.clone(),
    })
}
