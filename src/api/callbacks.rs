//! Dispatch callback endpoint
//!
//! POST /api/v1/callbacks/dispatch - Signed push-dispatch delivery
//!
//! A remote dispatcher (or this service's own remote publisher pointed back
//! at itself) delivers tasks here. The body is authenticated with an HMAC
//! signature before anything is parsed. Authentication failures are the
//! only non-200 responses for well-formed requests: once a delivery is
//! accepted, execution failures are the dead-letter queue's problem, and
//! returning an error would only provoke a redundant redelivery.

use axum::{
    body::Bytes,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Extension, Json, Router,
};
use chrono::Utc;
use conclave_core::{
    verify_signature, DispatchMessage, Orchestrator, Task, TaskRepository, TaskStatus,
    SIGNATURE_HEADER,
};
use std::sync::Arc;
use tracing::{info, warn};

use super::{ApiResponse, CallbackKeys};

/// Acknowledgement body; `dispatch_id` mirrors the remote publisher's reply
/// contract.
#[derive(Debug, serde::Serialize)]
pub struct DispatchAck {
    pub dispatch_id: String,
}

/// Rebuild a task record from a dispatch payload. Used when the delivery
/// reaches a node that has no store entry for the task yet.
fn task_from_message(message: DispatchMessage) -> Task {
    let now = Utc::now();
    Task {
        id: message.task_id,
        selection: message.selection,
        input: message.input,
        status: TaskStatus::Waiting,
        progress_percent: 0,
        result: Vec::new(),
        error: None,
        retry_count: 0,
        submitter: None,
        created_at: now,
        updated_at: now,
    }
}

/// Receive a signed dispatch delivery
pub async fn dispatch_callback(
    Extension(repo): Extension<TaskRepository>,
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    Extension(keys): Extension<Arc<CallbackKeys>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if signature.is_empty() {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::<DispatchAck>::error("missing signature")),
        );
    }

    let keys = keys.keys();
    if keys.is_empty() {
        warn!("dispatch callback received but no signing keys are configured");
        return (
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::error("callbacks are not configured")),
        );
    }
    if !verify_signature(&keys, &body, signature) {
        warn!("dispatch callback signature verification failed");
        return (
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::error("invalid signature")),
        );
    }

    let message: DispatchMessage = match serde_json::from_slice(&body) {
        Ok(message) => message,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::error(format!("malformed dispatch payload: {e}"))),
            );
        }
    };
    let task_id = message.task_id;

    match handle_delivery(&repo, &orchestrator, message).await {
        Ok(()) => {}
        Err(e) => {
            // Accepted delivery, failed execution: the task record and the
            // dead-letter queue carry the failure from here.
            warn!(task_id = %task_id, error = %e, "dispatched task failed");
        }
    }

    (
        StatusCode::OK,
        Json(ApiResponse::success(DispatchAck {
            dispatch_id: format!("cb-{task_id}"),
        })),
    )
}

async fn handle_delivery(
    repo: &TaskRepository,
    orchestrator: &Orchestrator,
    message: DispatchMessage,
) -> conclave_core::Result<()> {
    let task_id = message.task_id;
    match repo.load(task_id).await? {
        Some(task) if task.status.is_terminal() => {
            // Redelivery of a settled task
            info!(task_id = %task_id, status = ?task.status, "ignoring dispatch for terminal task");
            return Ok(());
        }
        Some(_) => {}
        None => {
            repo.save(&task_from_message(message)).await?;
        }
    }

    orchestrator.execute(task_id).await?;
    Ok(())
}

/// Create callback routes
pub fn callbacks_routes() -> Router {
    Router::new().route("/api/v1/callbacks/dispatch", post(dispatch_callback))
}
