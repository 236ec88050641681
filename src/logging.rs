// Structured Logging - Project Maester
// "Every message the tower sends is written down"

use crate::error::MaesterError;
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty, compact)
    pub format: String,
    /// Whether to include target module names
    pub include_targets: bool,
    /// Whether to include thread IDs
    pub include_thread_ids: bool,
    /// Whether to include file and line numbers
    pub include_file_line: bool,
    /// Span events to include (new, enter, exit, close, active, full)
    pub span_events: String,
    /// Whether to enable ANSI colors in output
    pub enable_colors: bool,
    /// Log file path (optional, logs to stdout if not specified)
    pub file_path: Option<String>,
    /// Environment filter override
    pub env_filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            include_targets: false,
            include_thread_ids: true,
            include_file_line: false,
            span_events: "new,close".to_string(),
            enable_colors: true,
            file_path: None,
            env_filter: None,
        }
    }
}

/// Logging format options
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = MaesterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            _ => {
                crate::maester_bail!(crate::maester_error!(
                    configuration,
                    format!("Invalid log format: {s}. Valid options: json, pretty, compact")
                ));
            }
        }
    }
}

/// Span events configuration
#[derive(Debug, Clone)]
pub struct SpanEvents {
    pub new: bool,
    pub enter: bool,
    pub exit: bool,
    pub close: bool,
    pub active: bool,
    pub full: bool,
}

impl SpanEvents {
    pub fn from_string(s: &str) -> Self {
        let events: Vec<String> = s.split(',').map(|s| s.trim().to_lowercase()).collect();

        Self {
            new: events.contains(&"new".to_string()) || events.contains(&"full".to_string()),
            enter: events.contains(&"enter".to_string()) || events.contains(&"full".to_string()),
            exit: events.contains(&"exit".to_string()) || events.contains(&"full".to_string()),
            close: events.contains(&"close".to_string()) || events.contains(&"full".to_string()),
            active: events.contains(&"active".to_string()) || events.contains(&"full".to_string()),
            full: events.contains(&"full".to_string()),
        }
    }

    pub fn to_fmt_span(&self) -> FmtSpan {
        let mut span = FmtSpan::NONE;

        if self.new {
            span |= FmtSpan::NEW;
        }
        if self.enter {
            span |= FmtSpan::ENTER;
        }
        if self.exit {
            span |= FmtSpan::EXIT;
        }
        if self.close {
            span |= FmtSpan::CLOSE;
        }
        if self.active {
            span |= FmtSpan::ACTIVE;
        }
        if self.full {
            FmtSpan::FULL
        } else {
            span
        }
    }
}

fn open_log_file(path: &str) -> Result<std::fs::File, MaesterError> {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| crate::maester_error!(configuration, format!("Failed to open log file: {e}")))
}

/// Initialize logging with the given configuration
pub fn init_logging(config: &LoggingConfig) -> Result<(), MaesterError> {
    // Parse log level
    let level = config.level.parse::<Level>().map_err(|_| {
        crate::maester_error!(
            configuration,
            format!("Invalid log level: {}", config.level)
        )
    })?;

    // Parse log format
    let format = config.format.parse::<LogFormat>()?;

    // Create environment filter
    let env_filter = if let Some(ref filter) = config.env_filter {
        EnvFilter::try_new(filter)
            .map_err(|e| crate::maester_error!(configuration, format!("Invalid env filter: {e}")))?
    } else {
        EnvFilter::from_default_env()
            .add_directive(
                format!("academic_records_sync_server={level}")
                    .parse()
                    .unwrap(),
            )
            .add_directive(format!("maester={level}").parse().unwrap())
    };

    // Parse span events
    let span_events = SpanEvents::from_string(&config.span_events);

    // Create the subscriber based on format and configuration
    let subscriber = Registry::default().with(env_filter);

    match format {
        LogFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_target(config.include_targets)
                .with_thread_ids(config.include_thread_ids)
                .with_file(config.include_file_line)
                .with_line_number(config.include_file_line)
                .with_span_events(span_events.to_fmt_span());

            if let Some(ref file_path) = config.file_path {
                let file = open_log_file(file_path)?;
                subscriber.with(layer.with_writer(Arc::new(file))).init();
            } else {
                subscriber.with(layer.with_writer(io::stdout)).init();
            }
        }
        LogFormat::Pretty => {
            let layer = fmt::layer()
                .pretty()
                .with_target(config.include_targets)
                .with_thread_ids(config.include_thread_ids)
                .with_file(config.include_file_line)
                .with_line_number(config.include_file_line)
                .with_span_events(span_events.to_fmt_span())
                .with_ansi(config.enable_colors);

            if let Some(ref file_path) = config.file_path {
                let file = open_log_file(file_path)?;
                subscriber.with(layer.with_writer(Arc::new(file))).init();
            } else {
                subscriber.with(layer.with_writer(io::stdout)).init();
            }
        }
        LogFormat::Compact => {
            let layer = fmt::layer()
                .compact()
                .with_target(config.include_targets)
                .with_thread_ids(config.include_thread_ids)
                .with_file(config.include_file_line)
                .with_line_number(config.include_file_line)
                .with_span_events(span_events.to_fmt_span())
                .with_ansi(config.enable_colors);

            if let Some(ref file_path) = config.file_path {
                let file = open_log_file(file_path)?;
                subscriber.with(layer.with_writer(Arc::new(file))).init();
            } else {
                subscriber.with(layer.with_writer(io::stdout)).init();
            }
        }
    }

    tracing::info!(
        "⚬ Logging initialized with level: {}, format: {}",
        config.level,
        config.format
    );

    Ok(())
}

/// Error logging helper
pub fn log_error_with_context(error: &MaesterError, context: &str) {
    let level = error.severity();
    match level {
        Level::ERROR => tracing::error!(
            error = %error,
            context = context,
            category = error.category(),
            retryable = error.is_retryable(),
            "Operation failed with error"
        ),
        Level::WARN => tracing::warn!(
            error = %error,
            context = context,
            category = error.category(),
            retryable = error.is_retryable(),
            "Operation failed with error"
        ),
        Level::INFO => tracing::info!(
            error = %error,
            context = context,
            category = error.category(),
            retryable = error.is_retryable(),
            "Operation failed with error"
        ),
        Level::DEBUG => tracing::debug!(
            error = %error,
            context = context,
            category = error.category(),
            retryable = error.is_retryable(),
            "Operation failed with error"
        ),
        Level::TRACE => tracing::trace!(
            error = %error,
            context = context,
            category = error.category(),
            retryable = error.is_retryable(),
            "Operation failed with error"
        ),
    }
}
