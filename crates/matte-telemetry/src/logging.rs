//! Structured logging with JSON output.
//!
//! Structured JSON to stdout in production, pretty output for local runs.

use crate::{LogFormat, TelemetryConfig, TelemetryError};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize the logging subsystem.
///
/// Sets up tracing-subscriber with either JSON or pretty format,
/// respecting the configured log level.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.log_format {
        LogFormat::Json => init_json_logging(filter),
        LogFormat::Pretty => init_pretty_logging(filter),
    }
}

fn init_json_logging(filter: EnvFilter) -> Result<(), TelemetryError> {
    let json_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_current_span(true)
        .with_span_list(false)
        .with_file(false)
        .with_line_number(false)
        .flatten_event(true)
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(json_layer)
        .try_init()
        .map_err(|e: tracing_subscriber::util::TryInitError| {
            TelemetryError::LoggingInit(e.to_string())
        })
}

fn init_pretty_logging(filter: EnvFilter) -> Result<(), TelemetryError> {
    let pretty_layer = fmt::layer()
        .pretty()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(pretty_layer)
        .try_init()
        .map_err(|e: tracing_subscriber::util::TryInitError| {
            TelemetryError::LoggingInit(e.to_string())
        })
}

/// Standard log event names.
pub mod events {
    /// Service is starting up.
    pub const STARTUP: &str = "startup";

    /// Service is shutting down.
    pub const SHUTDOWN: &str = "shutdown";

    /// Listener bound and accepting connections.
    pub const LISTENING: &str = "listening";

    /// An image went through the removal collaborator.
    pub const IMAGE_PROCESSED: &str = "image_processed";

    /// Request payload was rejected.
    pub const VALIDATION_FAILURE: &str = "validation_failure";

    /// Credential missing or mismatched.
    pub const AUTH_FAILURE: &str = "auth_failure";

    /// Removal collaborator failed.
    pub const PROCESSING_ERROR: &str = "processing_error";

    /// Proxy could not reach or understand the upstream gateway.
    pub const UPSTREAM_ERROR: &str = "upstream_error";

    /// TLS material unavailable, serving plain HTTP instead.
    pub const TLS_FALLBACK: &str = "tls_fallback";
}

/// Helper macros for structured logging with standard fields.
///
/// These wrap the tracing macros to ensure consistent field naming.
#[macro_export]
macro_rules! log_startup {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::STARTUP,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_shutdown {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::SHUTDOWN,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_listening {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::LISTENING,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_image_processed {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::IMAGE_PROCESSED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_validation_failure {
    ($($field:tt)*) => {
        tracing::warn!(
            event = $crate::logging::events::VALIDATION_FAILURE,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_auth_failure {
    ($($field:tt)*) => {
        tracing::warn!(
            event = $crate::logging::events::AUTH_FAILURE,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_processing_error {
    ($($field:tt)*) => {
        tracing::error!(
            event = $crate::logging::events::PROCESSING_ERROR,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_upstream_error {
    ($($field:tt)*) => {
        tracing::error!(
            event = $crate::logging::events::UPSTREAM_ERROR,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_tls_fallback {
    ($($field:tt)*) => {
        tracing::warn!(
            event = $crate::logging::events::TLS_FALLBACK,
            $($field)*
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    // Subscriber installation is global per process, so only the
    // configuration logic is covered here.

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("JSON"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("pretty"), Some(LogFormat::Pretty));
        assert_eq!(LogFormat::parse("PRETTY"), Some(LogFormat::Pretty));
        assert_eq!(LogFormat::parse("invalid"), None);
    }

    #[test]
    fn test_event_names_are_distinct() {
        let names = [
            events::STARTUP,
            events::SHUTDOWN,
            events::LISTENING,
            events::IMAGE_PROCESSED,
            events::VALIDATION_FAILURE,
            events::AUTH_FAILURE,
            events::PROCESSING_ERROR,
            events::UPSTREAM_ERROR,
            events::TLS_FALLBACK,
        ];
        let unique: std::collections::HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
    }
}
