use crate::app::startup::StoreSet;
use crate::circuit_breaker::CircuitBreakerRegistry;
use crate::error::{MaesterError, MaesterResult};
use crate::monitoring::HealthMonitor;
use crate::sync::RetryQueue;
use std::sync::Arc;
use tracing::info;

/// Wait for shutdown signals
pub async fn wait_for_shutdown_signal() -> MaesterResult<()> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(|e| MaesterError::internal(format!("Failed to setup SIGTERM handler: {e}")))?;

    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
        .map_err(|e| MaesterError::internal(format!("Failed to setup SIGINT handler: {e}")))?;

    // Keep the server running and wait for shutdown signals
    tokio::select! {
        _ = sigint.recv() => {
            info!("📡 Received SIGINT (Ctrl+C) shutdown signal");
        }
        _ = sigterm.recv() => {
            info!("📡 Received SIGTERM shutdown signal");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("📡 Received CTRL+C shutdown signal");
        }
    }

    Ok(())
}

/// Perform graceful shutdown sequence
pub async fn perform_graceful_shutdown(
    queue: RetryQueue,
    monitor: Arc<HealthMonitor>,
    http_handle: tokio::task::JoinHandle<()>,
    stores: StoreSet,
    registry: Arc<CircuitBreakerRegistry>,
) -> MaesterResult<()> {
    info!("🌙 Shutting down Project Maester gracefully...");
    info!("🛑 Starting graceful shutdown sequence...");

    // 1. Stop replaying queued operations
    queue.stop_processing();
    info!("📮 Sync queue processing stopped, pending operations stay queued");

    // 2. Stop the health probe loop
    monitor.stop().await;

    // 3. Stop serving operator endpoints
    http_handle.abort();
    info!("⚕ Monitoring endpoints stopped");

    // 4. Disconnect the store adapters
    stores.auth.shutdown().await;
    stores.academic.shutdown().await;
    stores.profiles.shutdown().await;
    info!("🏦 Store adapters disconnected");

    // 5. Get final statistics
    let queue_stats = queue.get_statistics().await;
    let breaker_stats = registry.get_all_stats().await;

    info!("📊 Final statistics:");
    info!("  📮 Sync Queue: {:?}", queue_stats);
    info!("  🔌 Circuit Breakers: {:?}", breaker_stats);

    info!("🌙 Project Maester shutdown complete");
    info!("The watch ends, but the records remain");

    Ok(())
}
