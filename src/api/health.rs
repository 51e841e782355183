//! Health check endpoints with component-level diagnostics.
//!
//! Provides:
//! - `/health` — simple "healthy" + version (for load balancers)
//! - `/health/detailed` — per-component status (store, queue, dead_letter)

use axum::extract::Extension;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use conclave_core::{DeadLetterQueue, KvStore, TaskQueue};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

/// Simple health response
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Detailed health response with per-component checks
#[derive(Debug, Serialize)]
pub struct DetailedHealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub checks: HealthChecks,
}

/// All component health checks
#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub store: ComponentHealth,
    pub queue: ComponentHealth,
    pub dead_letter: ComponentHealth,
}

/// Individual component health status
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ComponentHealth {
    fn healthy(latency_ms: u64) -> Self {
        Self {
            status: "healthy",
            latency_ms: Some(latency_ms),
            error: None,
            details: None,
        }
    }

    fn healthy_with_details(latency_ms: u64, details: serde_json::Value) -> Self {
        Self {
            status: "healthy",
            latency_ms: Some(latency_ms),
            error: None,
            details: Some(details),
        }
    }

    fn unhealthy(error: String) -> Self {
        Self {
            status: "unhealthy",
            latency_ms: None,
            error: Some(error),
            details: None,
        }
    }
}

/// Simple health check (for load balancers)
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness probe: healthy only when the store answers
async fn readiness_check(
    Extension(kv): Extension<Arc<dyn KvStore>>,
) -> (axum::http::StatusCode, Json<HealthResponse>) {
    match kv.ping().await {
        Ok(()) => (
            axum::http::StatusCode::OK,
            Json(HealthResponse {
                status: "ready",
                version: env!("CARGO_PKG_VERSION"),
            }),
        ),
        Err(_) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "unavailable",
                version: env!("CARGO_PKG_VERSION"),
            }),
        ),
    }
}

/// Detailed health check with all component statuses
async fn detailed_health_check(
    Extension(kv): Extension<Arc<dyn KvStore>>,
    Extension(queue): Extension<Arc<TaskQueue>>,
    Extension(dlq): Extension<Arc<DeadLetterQueue>>,
) -> Json<DetailedHealthResponse> {
    let store_health = check_store(kv.as_ref()).await;
    let queue_health = check_queue(&queue);
    let dlq_health = check_dead_letter(&dlq).await;

    let components = [
        store_health.status,
        queue_health.status,
        dlq_health.status,
    ];
    let healthy_count = components.iter().filter(|s| **s == "healthy").count();
    let unhealthy_count = components.iter().filter(|s| **s == "unhealthy").count();

    let overall_status = if unhealthy_count == 0 {
        "healthy"
    } else if healthy_count > 0 {
        "degraded"
    } else {
        "unhealthy"
    };

    Json(DetailedHealthResponse {
        status: overall_status,
        version: env!("CARGO_PKG_VERSION"),
        checks: HealthChecks {
            store: store_health,
            queue: queue_health,
            dead_letter: dlq_health,
        },
    })
}

/// Check store connectivity
async fn check_store(kv: &dyn KvStore) -> ComponentHealth {
    let start = std::time::Instant::now();
    match kv.ping().await {
        Ok(()) => ComponentHealth::healthy(start.elapsed().as_millis() as u64),
        Err(e) => ComponentHealth::unhealthy(e.to_string()),
    }
}

/// Check local pool load (no I/O)
fn check_queue(queue: &TaskQueue) -> ComponentHealth {
    ComponentHealth::healthy_with_details(
        0,
        serde_json::json!({
            "in_flight": queue.in_flight(),
        }),
    )
}

/// Check dead-letter backlog
async fn check_dead_letter(dlq: &DeadLetterQueue) -> ComponentHealth {
    let start = std::time::Instant::now();
    let backlog = dlq.len().await;
    let permanent = dlq.permanent_failures().await;
    match (backlog, permanent) {
        (Ok(backlog), Ok(permanent)) => ComponentHealth::healthy_with_details(
            start.elapsed().as_millis() as u64,
            serde_json::json!({
                "backlog": backlog,
                "permanent_failures": permanent,
            }),
        ),
        (Err(e), _) | (_, Err(e)) => ComponentHealth::unhealthy(e.to_string()),
    }
}

/// Create health check routes
pub fn health_routes() -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/health/detailed", get(detailed_health_check))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_health_serialization() {
        let healthy = ComponentHealth::healthy(3);
        let json = serde_json::to_string(&healthy).unwrap();
        assert!(json.contains("\"latency_ms\":3"));
        assert!(!json.contains("error"));

        let unhealthy = ComponentHealth::unhealthy("connection refused".to_string());
        let json = serde_json::to_string(&unhealthy).unwrap();
        assert!(json.contains("unhealthy"));
        assert!(json.contains("connection refused"));
    }

    #[test]
    fn test_health_response_carries_version() {
        let response = HealthResponse {
            status: "healthy",
            version: env!("CARGO_PKG_VERSION"),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains(env!("CARGO_PKG_VERSION")));
    }
}
