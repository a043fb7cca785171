//! # Dantalion
//!
//! *"The Duke reveals all secrets"*
//!
//! Dantalion sets up logging for Paimon binaries.
//!
//! ## Features
//!
//! - **Structured Logging**: Pretty or JSON-formatted `tracing` output
//! - **Env Overrides**: `RUST_LOG` takes precedence over the configured level

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod logging;

pub use logging::{build_filter, init_logging};

/// Configuration for logging.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name recorded at startup.
    pub service_name: String,
    /// Log level or filter directive, e.g. `info` or `beleth=debug`.
    pub log_level: String,
    /// Enable JSON logging.
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::new("paimon")
    }
}

impl TelemetryConfig {
    /// Creates a new telemetry configuration.
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }

    /// Sets the log level.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Enables JSON logging.
    #[must_use]
    pub fn with_json_logs(mut self, enabled: bool) -> Self {
        self.json_logs = enabled;
        self
    }
}
