// Error Handling Module - Project Maester
// "Name each ailment before you treat it"

use axum::http::StatusCode;
use thiserror::Error;

/// Comprehensive error types for the academic records synchronization server
#[derive(Error, Debug, Clone)]
pub enum MaesterError {
    // Store and transport errors
    #[error("Store connection failed: {message}")]
    ConnectionError { message: String },

    #[error("Store operation failed: {store}: {message}")]
    StoreQuery { store: String, message: String },

    #[error("Circuit breaker is open: {message}")]
    CircuitOpen { message: String },

    // Domain errors
    #[error("Constraint violation: {message}")]
    ConstraintViolation { message: String },

    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    // Synchronization errors
    #[error("{message}")]
    SyncQueued { message: String },

    #[error("Synchronization permanently failed for operation {operation_id}: {message}")]
    PermanentSyncFailure {
        operation_id: String,
        message: String,
    },

    #[error("Sync queue full: {size}/{max_size}")]
    QueueFull { size: usize, max_size: usize },

    #[error("Sync queue processing failed: {message}")]
    SyncProcessing { message: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidConfigValue { key: String, value: String },

    // Generic errors
    #[error("Serialization failed: {message}")]
    Serialization { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl MaesterError {
    /// Create a store connection error
    pub fn connection_error<S: Into<String>>(message: S) -> Self {
        Self::ConnectionError {
            message: message.into(),
        }
    }

    /// Create a store operation error
    pub fn store_query<S: Into<String>, M: Into<String>>(store: S, message: M) -> Self {
        Self::StoreQuery {
            store: store.into(),
            message: message.into(),
        }
    }

    /// Create a circuit breaker error
    pub fn circuit_open<S: Into<String>>(message: S) -> Self {
        Self::CircuitOpen {
            message: message.into(),
        }
    }

    /// Create a constraint violation error
    pub fn constraint_violation<S: Into<String>>(message: S) -> Self {
        Self::ConstraintViolation {
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a sync queued error
    pub fn sync_queued<S: Into<String>>(message: S) -> Self {
        Self::SyncQueued {
            message: message.into(),
        }
    }

    /// Create a permanent sync failure error
    pub fn permanent_sync_failure<I: Into<String>, M: Into<String>>(
        operation_id: I,
        message: M,
    ) -> Self {
        Self::PermanentSyncFailure {
            operation_id: operation_id.into(),
            message: message.into(),
        }
    }

    /// Create a queue full error
    pub fn queue_full(size: usize, max_size: usize) -> Self {
        Self::QueueFull { size, max_size }
    }

    /// Create a sync processing error
    pub fn sync_processing<S: Into<String>>(message: S) -> Self {
        Self::SyncProcessing {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an invalid config value error
    pub fn invalid_config_value<K: Into<String>, V: Into<String>>(key: K, value: V) -> Self {
        Self::InvalidConfigValue {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>>(message: S) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get error category for metrics and logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::ConnectionError { .. } => "connection",
            Self::StoreQuery { .. } => "store",
            Self::CircuitOpen { .. } => "circuit_breaker",
            Self::ConstraintViolation { .. } | Self::Validation { .. } => "validation",
            Self::NotFound { .. } => "not_found",
            Self::SyncQueued { .. }
            | Self::PermanentSyncFailure { .. }
            | Self::QueueFull { .. }
            | Self::SyncProcessing { .. } => "sync",
            Self::Configuration { .. } | Self::InvalidConfigValue { .. } => "configuration",
            Self::Serialization { .. } => "serialization",
            Self::Internal { .. } => "general",
        }
    }

    /// Check if error is transient and worth retrying against the same store
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionError { .. } | Self::CircuitOpen { .. }
        )
    }

    /// Check if error indicates a broken transport to a store
    ///
    /// Tagged `ConnectionError` variants are authoritative. For errors that
    /// reached us as plain text (store clients outside this crate may only
    /// surface strings), fall back to the centralized signature match.
    pub fn is_connection_related(&self) -> bool {
        match self {
            Self::ConnectionError { .. } => true,
            Self::StoreQuery { message, .. } | Self::Internal { message } => {
                matches_connection_signature(message)
            }
            _ => false,
        }
    }

    /// Get severity level for logging
    pub fn severity(&self) -> tracing::Level {
        match self {
            // Critical errors
            Self::ConnectionError { .. }
            | Self::CircuitOpen { .. }
            | Self::PermanentSyncFailure { .. }
            | Self::QueueFull { .. } => tracing::Level::ERROR,

            // Warning level errors
            Self::StoreQuery { .. } | Self::SyncQueued { .. } | Self::SyncProcessing { .. } => {
                tracing::Level::WARN
            }

            // Info level errors
            Self::NotFound { .. } | Self::ConstraintViolation { .. } => tracing::Level::INFO,

            // Debug level errors
            Self::Validation { .. }
            | Self::Configuration { .. }
            | Self::InvalidConfigValue { .. }
            | Self::Serialization { .. }
            | Self::Internal { .. } => tracing::Level::DEBUG,
        }
    }
}

/// Transport error signatures recognized by the message classifier
///
/// Substring matching is a known fragility: it only applies to errors that
/// arrive as plain text. The `StoreClient` seam returns tagged variants that
/// never take this path.
const CONNECTION_ERROR_SIGNATURES: &[&str] = &[
    "connection refused",
    "econnrefused",
    "timed out",
    "etimedout",
    "enotfound",
    "name or service not known",
    "failed to lookup address",
    "connection terminated",
    "connection closed",
    "connection reset",
    "broken pipe",
];

/// Check whether an error message matches a known transport failure signature
pub fn matches_connection_signature(message: &str) -> bool {
    let lowered = message.to_lowercase();
    CONNECTION_ERROR_SIGNATURES
        .iter()
        .any(|signature| lowered.contains(signature))
}

/// Convert MaesterError to an HTTP status for operator-facing responses
impl From<&MaesterError> for StatusCode {
    fn from(error: &MaesterError) -> Self {
        match error {
            MaesterError::ConstraintViolation { .. } | MaesterError::Validation { .. } => {
                StatusCode::BAD_REQUEST
            }

            MaesterError::NotFound { .. } => StatusCode::NOT_FOUND,

            MaesterError::ConnectionError { .. }
            | MaesterError::CircuitOpen { .. }
            | MaesterError::SyncQueued { .. }
            | MaesterError::QueueFull { .. } => StatusCode::SERVICE_UNAVAILABLE,

            MaesterError::StoreQuery { .. }
            | MaesterError::PermanentSyncFailure { .. }
            | MaesterError::SyncProcessing { .. }
            | MaesterError::Configuration { .. }
            | MaesterError::InvalidConfigValue { .. }
            | MaesterError::Serialization { .. }
            | MaesterError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convert anyhow::Error to MaesterError
impl From<anyhow::Error> for MaesterError {
    fn from(error: anyhow::Error) -> Self {
        MaesterError::internal(error.to_string())
    }
}

/// Convert std::io::Error to MaesterError
impl From<std::io::Error> for MaesterError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::TimedOut => MaesterError::connection_error(error.to_string()),
            _ => MaesterError::internal(error.to_string()),
        }
    }
}

/// Convert serde_json::Error to MaesterError
impl From<serde_json::Error> for MaesterError {
    fn from(error: serde_json::Error) -> Self {
        MaesterError::serialization(error.to_string())
    }
}

/// Result type alias for convenience
pub type MaesterResult<T> = Result<T, MaesterError>;

/// Macro for creating errors through the constructor helpers
#[macro_export]
macro_rules! maester_error {
    ($variant:ident, $($arg:expr),*) => {
        $crate::error::MaesterError::$variant($($arg),*)
    };
}

/// Macro for early return with error logging
#[macro_export]
macro_rules! maester_bail {
    ($error:expr) => {
        {
            let error = $error;
            match error.severity() {
                tracing::Level::ERROR => tracing::error!(error = %error, "Operation failed"),
                tracing::Level::WARN => tracing::warn!(error = %error, "Operation failed"),
                tracing::Level::INFO => tracing::info!(error = %error, "Operation failed"),
                tracing::Level::DEBUG => tracing::debug!(error = %error, "Operation failed"),
                tracing::Level::TRACE => tracing::trace!(error = %error, "Operation failed"),
            }
            return Err(error);
        }
    };
}
