//! API Documentation - Swagger UI
//!
//! Provides OpenAPI documentation at /docs

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::{
    health::HealthResponse,
    tasks::{PhaseResultView, SubmitTaskRequest, SubmitTaskResponse, TaskView},
    ApiResponse,
};

/// Conclave API OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Conclave API",
        version = "1.0.0",
        description = "Multi-agent task orchestration REST API.

## Overview
Conclave runs client prompts through single-agent pipelines or multi-agent
councils and exposes:
- **Tasks**: Submit, poll, and cancel orchestrated tasks
- **Streaming**: Live progress events over SSE at `/api/v1/tasks/{id}/stream`
- **Health**: Liveness and per-component diagnostics

## Dispatch callbacks
`POST /api/v1/callbacks/dispatch` accepts HMAC-signed deliveries from a
remote dispatcher. It is machine-facing and not documented here.
",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "/", description = "Local server")
    ),
    paths(
        // Tasks
        crate::api::tasks::submit_task,
        crate::api::tasks::get_task,
        crate::api::tasks::cancel_task,
        // Stream
        crate::api::stream::stream_task,
        // Health
        crate::api::health::health_check,
    ),
    components(
        schemas(
            // Tasks
            SubmitTaskRequest,
            SubmitTaskResponse,
            TaskView,
            PhaseResultView,
            ApiResponse<SubmitTaskResponse>,
            ApiResponse<TaskView>,
            // Health
            HealthResponse,
        )
    ),
    tags(
        (name = "tasks", description = "Task submission, status, and streaming"),
        (name = "health", description = "Service health"),
    )
)]
pub struct ApiDoc;

/// Create documentation routes
pub fn docs_routes() -> Router {
    Router::new().merge(SwaggerUi::new("/docs").url("/api/openapi.json", ApiDoc::openapi()))
}
