//! Error types for conclave-core

use thiserror::Error;
use uuid::Uuid;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Shared key-value store failure (connection, command, serialization)
    #[error("store error: {0}")]
    Store(String),

    /// Model backend failure
    #[error("model error: {0}")]
    Model(#[from] conclave_llm::Error),

    /// Fewer backends or agents survived than the operation requires
    #[error("below threshold: {got} of {need} required responses")]
    BelowThreshold {
        /// Surviving responses
        got: usize,
        /// Minimum required
        need: usize,
    },

    /// Agent pipeline failure
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// Task id is unknown
    #[error("task not found: {0}")]
    TaskNotFound(Uuid),

    /// Task was cancelled cooperatively
    #[error("task cancelled: {0}")]
    Cancelled(Uuid),

    /// Remote dispatch publish failure
    #[error("dispatch error: {0}")]
    Dispatch(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Store(format!("serialization failed: {e}"))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
