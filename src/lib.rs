// Project Maester - Core Library
// "The maesters keep the records of the realm"

pub mod app;
pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod logging;
pub mod monitoring;
pub mod store;
pub mod sync;

// Re-export commonly used types
pub use config::Config;
pub use error::{MaesterError, MaesterResult};
pub use logging::LoggingConfig;
