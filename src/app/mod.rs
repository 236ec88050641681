// Project Maester - Academic Records Sync Server
// The Citadel's watch begins here - "Records must not contradict"

pub mod cli;
pub mod shutdown;
pub mod startup;

use crate::error::MaesterResult;
use std::sync::Arc;
use tracing::info;

use self::cli::{parse_cli_args, print_version_info};
use self::shutdown::{perform_graceful_shutdown, wait_for_shutdown_signal};
use self::startup::{
    initialize_circuit_breakers, initialize_logging, initialize_monitoring,
    initialize_store_adapters, initialize_sync_layer, load_and_validate_config,
    validate_dependencies,
};

/// Main application entry point and coordination
pub async fn run() -> MaesterResult<()> {
    // Parse command line arguments
    let args = parse_cli_args();

    // Print version information
    print_version_info();

    // Initialize basic logging first
    initialize_logging(&args)?;

    info!("🏛 Project Maester is awakening...");
    info!("The citadel opens its gates - three keeps, one ledger");

    // Load and validate configuration with CLI overrides
    let config = load_and_validate_config(&args)?;

    // Validate system dependencies
    validate_dependencies(&config).await?;

    info!("🛡 Initializing resilience components...");

    // 1. Store adapters with reconnect handling
    let stores = initialize_store_adapters(&config).await?;

    // 2. Circuit Breaker Registry
    let registry = initialize_circuit_breakers(&stores).await?;

    // 3. Retry queue, replay handlers, and saga orchestrators
    let sync = initialize_sync_layer(&config, &stores).await?;

    // 4. Health monitor and operator endpoints
    let (monitor, http_handle) = initialize_monitoring(
        &config,
        &stores,
        Arc::clone(&registry),
        sync.queue.clone(),
    )
    .await?;

    info!("✅ Project Maester initialized successfully");
    info!(
        "⚕ Health checks available on port {}",
        config.monitoring.health_check_port
    );
    info!("✅ Project Maester is ready - the ravens may fly");

    // Wait for shutdown signals
    wait_for_shutdown_signal().await?;

    // Perform graceful shutdown
    perform_graceful_shutdown(sync.queue, monitor, http_handle, stores, registry).await?;

    Ok(())
}
