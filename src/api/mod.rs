//! HTTP API for the Conclave server
//!
//! REST endpoints for task submission, status, cancellation, the SSE live
//! stream, and the signed remote-dispatch callback.

pub mod callbacks;
pub mod docs;
pub mod health;
pub mod stream;
pub mod tasks;

use axum::Router;
use serde::Serialize;
use std::time::Duration;
use utoipa::ToSchema;

pub use callbacks::callbacks_routes;
pub use docs::docs_routes;
pub use health::health_routes;
pub use stream::stream_routes;
pub use tasks::tasks_routes;

/// API response wrapper
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> ApiResponse<T> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Signing keys accepted on the dispatch callback. `next` is set during key
/// rotation so messages signed with either key verify.
#[derive(Debug, Clone)]
pub struct CallbackKeys {
    current: Option<String>,
    next: Option<String>,
}

impl CallbackKeys {
    #[must_use]
    pub fn new(current: Option<String>, next: Option<String>) -> Self {
        Self { current, next }
    }

    /// All usable keys, current first
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.current
            .iter()
            .chain(self.next.iter())
            .map(String::as_str)
            .collect()
    }
}

/// Per-connection stream timing knobs
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Buffer poll interval
    pub poll_interval: Duration,
    /// Keep-alive ping interval
    pub heartbeat: Duration,
    /// Absolute wall-clock ceiling per connection
    pub max_duration: Duration,
}

/// Create the API router with all endpoints
pub fn api_router() -> Router {
    Router::new()
        .merge(tasks_routes())
        .merge(stream_routes())
        .merge(callbacks_routes())
}
