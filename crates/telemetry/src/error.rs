//! Telemetry Error Types

use thiserror::Error;

/// Errors raised while talking to the monitoring backend
#[derive(Debug, Clone, Error)]
pub enum TelemetryError {
    /// Transport-level failure (connect, TLS, non-2xx status)
    #[error("HTTP error: {0}")]
    Http(String),

    /// A single call ran past its timeout
    #[error("{method} timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },

    /// The overall request deadline passed before the call could start
    #[error("Request deadline exceeded before {0}")]
    DeadlineExceeded(String),

    /// Login rejected or session no longer valid
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Backend returned a JSON-RPC error object
    #[error("RPC error {code} in {method}: {message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },

    /// Response body did not have the expected shape
    #[error("Decode error: {0}")]
    Decode(String),
}

impl TelemetryError {
    /// Whether a caller may reasonably retry the whole request later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TelemetryError::Http(_)
                | TelemetryError::Timeout { .. }
                | TelemetryError::DeadlineExceeded(_)
                | TelemetryError::Auth(_)
        )
    }
}

impl From<reqwest::Error> for TelemetryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            TelemetryError::Decode(err.to_string())
        } else {
            TelemetryError::Http(err.to_string())
        }
    }
}
