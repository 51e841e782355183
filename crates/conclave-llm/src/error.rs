//! Error types for conclave-llm

use thiserror::Error;

/// Model backend error type
#[derive(Debug, Error)]
pub enum Error {
    /// Backend not configured
    #[error("backend not configured: {0}")]
    NotConfigured(String),

    /// API error
    #[error("api error: {0}")]
    Api(String),

    /// Rate limit exceeded
    #[error("rate limit exceeded")]
    RateLimit,

    /// Invalid response
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Network error
    #[error("network error: {0}")]
    Network(String),

    /// Timeout
    #[error("timeout after {0}ms")]
    Timeout(u64),
}

impl Error {
    /// Whether the error is worth an inline retry with backoff.
    ///
    /// Only transient-network conditions qualify; API and parse errors
    /// are surfaced immediately.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Timeout(_) | Error::RateLimit)
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
