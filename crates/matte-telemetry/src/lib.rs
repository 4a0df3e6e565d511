//! Logging infrastructure for the matte gateway and proxy.
//!
//! Both binaries share one logging setup so their output can be parsed by
//! the same collectors:
//! - Structured JSON logging (or pretty output for development)
//! - Standard event names and `log_*!` macros
//!
//! # Usage
//!
//! ```ignore
//! use matte_telemetry::{LogFormat, TelemetryConfig};
//!
//! let config = TelemetryConfig::new()
//!     .with_service_name("matte-proxy")
//!     .with_log_format(LogFormat::Pretty);
//!
//! matte_telemetry::init(&config)?;
//! ```

pub mod config;
pub mod logging;

pub use config::{LogFormat, TelemetryConfig};
pub use logging::events;

use thiserror::Error;

/// Telemetry errors.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to initialize logging.
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),
}

/// Install the global subscriber for this process.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    logging::init_logging(config)?;
    tracing::debug!(
        service = %config.service_name,
        level = %config.log_level,
        "logging initialized"
    );
    Ok(())
}
