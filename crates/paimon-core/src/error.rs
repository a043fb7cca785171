//! Error types for the Paimon assistant.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the Paimon assistant.
#[derive(Error, Debug)]
pub enum Error {
    /// Documents could not be loaded or indexed.
    #[error("Ingestion failed: {message}")]
    Ingestion {
        /// Description of the ingestion failure.
        message: String,
    },

    /// Input was rejected by a guardrail before reaching the model.
    #[error("Policy violation: {reason}")]
    PolicyViolation {
        /// Name of the guardrail that rejected the input.
        guardrail: String,
        /// Reason given by the guardrail.
        reason: String,
    },

    /// Model output did not conform to the requested schema.
    #[error("Failed to parse model output as {target}: {message}")]
    OutputParsing {
        /// Name of the expected output type.
        target: String,
        /// Parser error message.
        message: String,
        /// The raw model output.
        raw: String,
    },

    /// Chat or embedding backend failure.
    #[error("Backend error ({backend}): {message}")]
    Backend {
        /// Backend name (openai, hashing, ...).
        backend: String,
        /// Error message.
        message: String,
    },

    /// Operation timed out.
    #[error("Operation timed out after {duration:?}")]
    Timeout {
        /// Duration before timeout.
        duration: Duration,
    },

    /// Rate limited by the backend.
    #[error("Rate limited: retry after {retry_after:?}")]
    RateLimited {
        /// Duration to wait before retrying.
        retry_after: Duration,
    },

    /// A tool could not be found or failed to run.
    #[error("Tool '{tool}' failed: {message}")]
    Tool {
        /// Tool name.
        tool: String,
        /// Error message.
        message: String,
    },

    /// The model kept requesting tools past the configured limit.
    #[error("Tool loop exceeded {max_rounds} rounds without a final answer")]
    ToolLoopExceeded {
        /// Maximum number of tool rounds.
        max_rounds: u32,
    },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error (unexpected state).
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl Error {
    /// Returns `true` if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::RateLimited { .. })
    }

    /// Returns `true` if the caller's input caused the error.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::PolicyViolation { .. } | Self::InvalidConfig { .. })
    }

    /// Creates an internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a backend error with the given backend name and message.
    #[must_use]
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Creates an ingestion error.
    #[must_use]
    pub fn ingestion(message: impl Into<String>) -> Self {
        Self::Ingestion {
            message: message.into(),
        }
    }

    /// Creates a policy violation raised by the named guardrail.
    #[must_use]
    pub fn policy_violation(guardrail: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PolicyViolation {
            guardrail: guardrail.into(),
            reason: reason.into(),
        }
    }

    /// Creates a tool error.
    #[must_use]
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
