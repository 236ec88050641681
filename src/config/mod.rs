// Configuration Management - Project Maester
// "One set of rules for all three keeps"

use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::{MaesterError, MaesterResult};
use crate::logging::LoggingConfig;
use crate::monitoring::HealthMonitorConfig;
use crate::store::StoreAdapterConfig;
use crate::sync::RetryQueueConfig;

/// Main configuration structure for the academic records sync server
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub stores: StoresConfig,
    pub circuit_breaker: CircuitBreakerSettings,
    pub sync: SyncSettings,
    pub monitoring: MonitoringSettings,
    pub logging: LoggingConfig,
}

/// Per-store adapter settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoresConfig {
    pub auth: StoreSettings,
    pub academic: StoreSettings,
    pub profiles: StoreSettings,
}

/// Reconnection settings for a single store adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    pub max_reconnect_attempts: u64,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 5,
            reconnect_base_delay_ms: 1000,
            reconnect_max_delay_ms: 30000,
        }
    }
}

/// Circuit breaker settings shared by all store adapters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u64,
    pub success_threshold: u64,
    pub open_duration_seconds: u64,
    pub operation_timeout_seconds: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_duration_seconds: 60,
            operation_timeout_seconds: 30,
        }
    }
}

/// Retry queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    pub queue_max_size: usize,
    pub processing_interval_seconds: u64,
    pub max_retry_attempts: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            queue_max_size: 1000,
            processing_interval_seconds: 30,
            max_retry_attempts: 5,
        }
    }
}

/// Health monitoring settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringSettings {
    pub health_check_port: u16,
    pub health_check_interval_seconds: u64,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            health_check_port: 8080,
            health_check_interval_seconds: 30,
        }
    }
}

impl Config {
    /// Load configuration from environment variables and config files
    pub fn load() -> MaesterResult<Self> {
        Self::load_with_file(None)
    }

    /// Load configuration from environment variables and config files with optional custom config file
    pub fn load_with_file(config_file: Option<&str>) -> MaesterResult<Self> {
        info!("⚬ Loading configuration for the citadel...");

        let default_config = config::Config::try_from(&Config::default()).map_err(|e| {
            MaesterError::configuration(format!("Failed to load default configuration: {e}"))
        })?;

        let mut builder = ConfigBuilder::builder().add_source(default_config);

        // Add custom config file if specified, otherwise use default locations
        if let Some(config_path) = config_file {
            info!("Using custom config file: {}", config_path);
            builder = builder.add_source(File::with_name(config_path).required(true));
        } else {
            // Load environment-specific config file
            let env = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

            let config_file = match env.as_str() {
                "production" => "config/secret",       // Production uses secret.toml
                "development" => "config/development", // Development uses development.toml
                _ => "config/development",             // Default to development
            };

            info!("Loading configuration from: {}.toml", config_file);
            builder = builder.add_source(File::with_name(config_file).required(true));
        }

        // Add environment variables with prefix
        builder = builder.add_source(
            Environment::with_prefix("MAESTER")
                .prefix_separator("_")
                .separator("__"),
        );

        let config = builder
            .build()
            .map_err(|e| {
                MaesterError::configuration(format!("Failed to build configuration: {e}"))
            })?
            .try_deserialize::<Config>()
            .map_err(|e| {
                MaesterError::configuration(format!("Failed to deserialize configuration: {e}"))
            })?;

        // Validate configuration
        config.validate()?;

        info!("✓ Configuration loaded successfully");
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> MaesterResult<()> {
        info!("⚬ Validating configuration...");

        // Validate store adapter settings
        self.stores.validate()?;

        // Validate circuit breaker settings
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(MaesterError::invalid_config_value(
                "circuit_breaker.failure_threshold",
                self.circuit_breaker.failure_threshold.to_string(),
            ));
        }
        if self.circuit_breaker.success_threshold == 0 {
            return Err(MaesterError::invalid_config_value(
                "circuit_breaker.success_threshold",
                self.circuit_breaker.success_threshold.to_string(),
            ));
        }
        if self.circuit_breaker.open_duration_seconds == 0 {
            return Err(MaesterError::invalid_config_value(
                "circuit_breaker.open_duration_seconds",
                self.circuit_breaker.open_duration_seconds.to_string(),
            ));
        }

        // Validate sync queue settings
        if self.sync.queue_max_size == 0 {
            return Err(MaesterError::invalid_config_value(
                "sync.queue_max_size",
                self.sync.queue_max_size.to_string(),
            ));
        }
        if self.sync.processing_interval_seconds == 0 {
            return Err(MaesterError::invalid_config_value(
                "sync.processing_interval_seconds",
                self.sync.processing_interval_seconds.to_string(),
            ));
        }
        if self.sync.max_retry_attempts == 0 {
            return Err(MaesterError::invalid_config_value(
                "sync.max_retry_attempts",
                self.sync.max_retry_attempts.to_string(),
            ));
        }

        // Validate monitoring settings
        if self.monitoring.health_check_port == 0 {
            return Err(MaesterError::invalid_config_value(
                "monitoring.health_check_port",
                self.monitoring.health_check_port.to_string(),
            ));
        }
        if self.monitoring.health_check_interval_seconds == 0 {
            return Err(MaesterError::invalid_config_value(
                "monitoring.health_check_interval_seconds",
                self.monitoring.health_check_interval_seconds.to_string(),
            ));
        }

        // Validate logging settings
        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(MaesterError::invalid_config_value(
                "logging.level",
                self.logging.level.clone(),
            ));
        }
        if !["json", "pretty", "compact"].contains(&self.logging.format.as_str()) {
            return Err(MaesterError::invalid_config_value(
                "logging.format",
                self.logging.format.clone(),
            ));
        }

        info!("✓ Configuration validation passed");
        Ok(())
    }

    /// Log the effective configuration at startup
    pub fn log_summary(&self) {
        info!("Current Configuration for Project Maester:");
        info!(
            "  Monitoring: 0.0.0.0:{} (probe every {}s)",
            self.monitoring.health_check_port, self.monitoring.health_check_interval_seconds
        );
        info!(
            "  Circuit Breaker: opens after {} failures, recovers after {}s",
            self.circuit_breaker.failure_threshold, self.circuit_breaker.open_duration_seconds
        );
        info!(
            "  Sync Queue: {} slots, sweep every {}s, {} attempts per operation",
            self.sync.queue_max_size,
            self.sync.processing_interval_seconds,
            self.sync.max_retry_attempts
        );
        info!(
            "  Reconnect: auth {}x, academic {}x, profiles {}x",
            self.stores.auth.max_reconnect_attempts,
            self.stores.academic.max_reconnect_attempts,
            self.stores.profiles.max_reconnect_attempts
        );
        info!("  Log Level: {}", self.logging.level);
    }

    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit_breaker.failure_threshold,
            success_threshold: self.circuit_breaker.success_threshold,
            open_duration: Duration::from_secs(self.circuit_breaker.open_duration_seconds),
            operation_timeout: Duration::from_secs(self.circuit_breaker.operation_timeout_seconds),
        }
    }

    pub fn queue_config(&self) -> RetryQueueConfig {
        RetryQueueConfig {
            max_size: self.sync.queue_max_size,
            processing_interval: Duration::from_secs(self.sync.processing_interval_seconds),
            default_max_attempts: self.sync.max_retry_attempts,
        }
    }

    pub fn monitor_config(&self) -> HealthMonitorConfig {
        HealthMonitorConfig {
            probe_interval: Duration::from_secs(self.monitoring.health_check_interval_seconds),
        }
    }
}

impl StoresConfig {
    pub fn validate(&self) -> MaesterResult<()> {
        self.auth.validate("stores.auth")?;
        self.academic.validate("stores.academic")?;
        self.profiles.validate("stores.profiles")?;
        Ok(())
    }
}

impl StoreSettings {
    pub fn validate(&self, name: &str) -> MaesterResult<()> {
        if self.max_reconnect_attempts == 0 {
            return Err(MaesterError::invalid_config_value(
                format!("{name}.max_reconnect_attempts"),
                self.max_reconnect_attempts.to_string(),
            ));
        }
        if self.reconnect_base_delay_ms == 0 {
            return Err(MaesterError::invalid_config_value(
                format!("{name}.reconnect_base_delay_ms"),
                self.reconnect_base_delay_ms.to_string(),
            ));
        }
        if self.reconnect_max_delay_ms < self.reconnect_base_delay_ms {
            return Err(MaesterError::configuration(format!(
                "{}: Max reconnect delay must be >= base delay",
                name
            )));
        }
        Ok(())
    }

    pub fn adapter_config(&self) -> StoreAdapterConfig {
        StoreAdapterConfig {
            max_reconnect_attempts: self.max_reconnect_attempts,
            reconnect_base_delay: Duration::from_millis(self.reconnect_base_delay_ms),
            reconnect_max_delay: Duration::from_millis(self.reconnect_max_delay_ms),
        }
    }
}
