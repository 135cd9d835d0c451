//! Error types for the Floodgate library.

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Main error type for Floodgate operations.
#[derive(Error, Debug)]
pub enum FloodgateError {
    /// Quota exhaustion (local or server-signaled) that survived all retries.
    #[error("Rate limit exceeded for '{endpoint}': retry in {}s", wait.as_secs())]
    RateLimited {
        /// The endpoint key the quota applies to
        endpoint: String,
        /// How long the caller should wait before trying again
        wait: Duration,
        /// Absolute time at which the quota frees up
        retry_after: DateTime<Utc>,
    },

    /// The server answered HTTP 429. Carries the `Retry-After` hint when the
    /// server sent one. The retry driver consumes this variant; it only
    /// reaches callers that invoke an action outside `execute_with_retry`.
    #[error("Upstream reported rate limiting (HTTP 429)")]
    UpstreamThrottled {
        /// Parsed `Retry-After` header, if present
        retry_after: Option<Duration>,
    },

    /// The caller's cancellation signal fired.
    #[error("Operation cancelled")]
    Cancelled,

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FloodgateError {
    /// Whether this error is the terminal rate-limited failure.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FloodgateError::RateLimited { .. })
    }
}

/// Result type alias for Floodgate operations.
pub type Result<T> = std::result::Result<T, FloodgateError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_display_messages() {
        let err = FloodgateError::RateLimited {
            endpoint: "reports".to_string(),
            wait: Duration::from_secs(30),
            retry_after: Utc::now(),
        };
        assert_eq!(
            err.to_string(),
            "Rate limit exceeded for 'reports': retry in 30s"
        );

        assert_eq!(
            FloodgateError::Config("bad table".to_string()).to_string(),
            "Configuration error: bad table"
        );
        assert_eq!(
            FloodgateError::Cancelled.to_string(),
            "Operation cancelled"
        );
        assert_eq!(
            FloodgateError::UpstreamThrottled { retry_after: None }.to_string(),
            "Upstream reported rate limiting (HTTP 429)"
        );
    }
}
