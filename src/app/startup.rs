use crate::{
    circuit_breaker::CircuitBreakerRegistry,
    config::Config,
    error::{MaesterError, MaesterResult},
    logging::{init_logging, log_error_with_context, LoggingConfig},
    maester_bail,
    monitoring::{serve_health_endpoints, HealthMonitor, HealthRouterState},
    store::{MemoryStoreClient, StoreAdapter, StoreId},
    sync::{
        CourseRetryHandler, CourseSyncService, RetryQueue, TeacherRetryHandler, TeacherSyncService,
    },
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::app::cli::CliArgs;

/// The three store adapters the server runs against
pub struct StoreSet {
    pub auth: StoreAdapter,
    pub academic: StoreAdapter,
    pub profiles: StoreAdapter,
}

impl StoreSet {
    pub fn all(&self) -> [&StoreAdapter; 3] {
        [&self.auth, &self.academic, &self.profiles]
    }
}

/// Retry queue plus the saga orchestrators wired to it
pub struct SyncLayer {
    pub queue: RetryQueue,
    pub teachers: TeacherSyncService,
    pub courses: CourseSyncService,
}

/// Validate system dependencies and requirements
pub async fn validate_dependencies(config: &Config) -> MaesterResult<()> {
    info!("🔍 Validating system dependencies...");

    // Check if the health check port is available
    let health_bind_addr = format!("0.0.0.0:{}", config.monitoring.health_check_port);
    match tokio::net::TcpListener::bind(&health_bind_addr).await {
        Ok(listener) => {
            drop(listener);
            info!(
                "✅ Health check port {} is available",
                config.monitoring.health_check_port
            );
        }
        Err(e) => {
            error!(
                "❌ Cannot bind to health check port {}: {}",
                config.monitoring.health_check_port, e
            );
            return Err(MaesterError::configuration(format!(
                "Health check port {} is not available: {}",
                config.monitoring.health_check_port, e
            )));
        }
    }

    info!("✅ All system dependencies validated successfully");
    Ok(())
}

/// Initialize logging with the provided configuration
pub fn initialize_logging(args: &CliArgs) -> MaesterResult<()> {
    let basic_logging = LoggingConfig {
        level: args.log_level.clone().unwrap_or_else(|| "info".to_string()),
        format: "pretty".to_string(),
        ..Default::default()
    };

    if let Err(e) = init_logging(&basic_logging) {
        eprintln!("❌ Failed to initialize logging: {e}");
        return Err(e);
    }

    Ok(())
}

/// Load and validate configuration with CLI overrides
pub fn load_and_validate_config(args: &CliArgs) -> MaesterResult<Config> {
    // Initialize configuration with optional custom config file
    let mut config = match Config::load_with_file(args.config_file.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("❌ Failed to load configuration: {}", e);
            error!("💡 Try running with --validate to check configuration");
            maester_bail!(e);
        }
    };

    // Apply CLI overrides to configuration
    config = crate::app::cli::apply_cli_overrides(config, args);

    // Handle special CLI modes
    if args.validate_only {
        info!("🔍 Validating configuration only...");
        if let Err(e) = config.validate() {
            error!("❌ Configuration validation failed: {}", e);
            return Err(e);
        }
        println!("Configuration is valid!");
        std::process::exit(0);
    }

    if args.print_config {
        info!("📋 Printing configuration...");
        config.log_summary();
        std::process::exit(0);
    }

    // Print configuration summary
    config.log_summary();

    Ok(config)
}

/// Build the three store adapters and open their initial connections
pub async fn initialize_store_adapters(config: &Config) -> MaesterResult<StoreSet> {
    let breaker_config = config.breaker_config();

    let stores = StoreSet {
        auth: StoreAdapter::with_config(
            StoreId::Auth,
            Arc::new(MemoryStoreClient::new("auth")),
            config.stores.auth.adapter_config(),
            breaker_config.clone(),
        ),
        academic: StoreAdapter::with_config(
            StoreId::Academic,
            Arc::new(MemoryStoreClient::new("academic")),
            config.stores.academic.adapter_config(),
            breaker_config.clone(),
        ),
        profiles: StoreAdapter::with_config(
            StoreId::Profiles,
            Arc::new(MemoryStoreClient::new("profiles")),
            config.stores.profiles.adapter_config(),
            breaker_config,
        ),
    };

    // Initial connection failures are not fatal, reconnection takes over
    for adapter in stores.all() {
        if let Err(e) = adapter.connect().await {
            log_error_with_context(&e, "Initial store connection failed");
            warn!(
                "⟲ {} store will keep reconnecting in the background",
                adapter.store().as_str()
            );
        }
    }

    info!("🏦 Store adapters initialized for auth, academic, and profiles");
    Ok(stores)
}

/// Initialize circuit breaker registry
pub async fn initialize_circuit_breakers(
    stores: &StoreSet,
) -> MaesterResult<Arc<CircuitBreakerRegistry>> {
    let registry = Arc::new(CircuitBreakerRegistry::new());

    for adapter in stores.all() {
        registry.register(adapter.circuit_breaker()).await;
    }

    info!("🔌 Circuit breakers registered for all store adapters");
    Ok(registry)
}

/// Build the retry queue, replay handlers, and saga orchestrators
pub async fn initialize_sync_layer(config: &Config, stores: &StoreSet) -> MaesterResult<SyncLayer> {
    let queue = RetryQueue::new(config.queue_config());

    queue
        .register_retry_handler(Box::new(TeacherRetryHandler::new(
            stores.profiles.clone(),
            stores.academic.clone(),
        )))
        .await;
    queue
        .register_retry_handler(Box::new(CourseRetryHandler::new(
            stores.academic.clone(),
            stores.profiles.clone(),
        )))
        .await;

    if let Err(e) = queue.start_processing().await {
        log_error_with_context(&e, "Failed to start sync queue processing");
        maester_bail!(e);
    }

    let teachers = TeacherSyncService::new(
        stores.profiles.clone(),
        stores.academic.clone(),
        queue.clone(),
    );
    let courses = CourseSyncService::new(
        stores.academic.clone(),
        stores.profiles.clone(),
        queue.clone(),
    );

    info!("📮 Retry queue processing started, teacher and course sagas wired");
    Ok(SyncLayer {
        queue,
        teachers,
        courses,
    })
}

/// Initialize the health monitor and operator HTTP endpoints
pub async fn initialize_monitoring(
    config: &Config,
    stores: &StoreSet,
    registry: Arc<CircuitBreakerRegistry>,
    queue: RetryQueue,
) -> MaesterResult<(Arc<HealthMonitor>, JoinHandle<()>)> {
    info!("📊 Initializing monitoring and observability services...");

    let monitor = Arc::new(HealthMonitor::new(
        stores.auth.clone(),
        stores.academic.clone(),
        stores.profiles.clone(),
        config.monitor_config(),
    ));
    monitor.start().await;

    let state = Arc::new(HealthRouterState {
        monitor: Arc::clone(&monitor),
        registry,
        queue,
    });

    let (addr, http_handle) = serve_health_endpoints(state, config.monitoring.health_check_port)
        .await
        .map_err(|e| MaesterError::internal(e.to_string()))?;

    info!("  ⚕ Health checks on {}", addr);

    Ok((monitor, http_handle))
}
