//! Task API endpoints
//!
//! POST   /api/v1/tasks     - Submit a task
//! GET    /api/v1/tasks/:id - Poll task status
//! DELETE /api/v1/tasks/:id - Cancel a task

use axum::{
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use conclave_core::{AgentKind, AgentSelection, Task, TaskInput, TaskQueue};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use super::ApiResponse;

/// Task submission request. Exactly one of `agent_type` (single pipeline)
/// or `agent_set` (council of 2+) must be set.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitTaskRequest {
    /// Single agent kind (research, strategy, market, risk)
    pub agent_type: Option<String>,
    /// Two or more agent kinds for council mode
    pub agent_set: Option<Vec<String>>,
    /// The user's prompt
    pub prompt: String,
    /// Session the task belongs to
    pub session_id: Option<String>,
    /// Business entity the task concerns
    pub startup_id: Option<String>,
    /// Supporting document URIs
    #[serde(default)]
    pub documents: Vec<String>,
    /// Submitter identity, observability only
    pub submitter: Option<String>,
}

impl SubmitTaskRequest {
    /// Resolve the agent selection, validating kind names and arity
    pub fn selection(&self) -> Result<AgentSelection, String> {
        match (&self.agent_type, &self.agent_set) {
            (Some(_), Some(_)) => {
                Err("agent_type and agent_set are mutually exclusive".to_string())
            }
            (None, None) => Err("one of agent_type or agent_set is required".to_string()),
            (Some(kind), None) => {
                let kind = AgentKind::from_str(kind).map_err(|e| e.to_string())?;
                Ok(AgentSelection::Single(kind))
            }
            (None, Some(kinds)) => {
                if kinds.len() < 2 {
                    return Err("agent_set requires at least 2 agent kinds".to_string());
                }
                let kinds = kinds
                    .iter()
                    .map(|k| AgentKind::from_str(k).map_err(|e| e.to_string()))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(AgentSelection::Council(kinds))
            }
        }
    }

    fn input(&self) -> TaskInput {
        TaskInput {
            prompt: self.prompt.clone(),
            session_id: self.session_id.clone(),
            startup_id: self.startup_id.clone(),
            documents: self.documents.clone(),
        }
    }
}

/// Submission receipt
#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitTaskResponse {
    pub task_id: Uuid,
    pub dispatch_id: String,
}

/// One recorded pipeline phase
#[derive(Debug, Serialize, ToSchema)]
pub struct PhaseResultView {
    pub phase: String,
    pub content: String,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Task status view
#[derive(Debug, Serialize, ToSchema)]
pub struct TaskView {
    pub task_id: Uuid,
    pub status: String,
    pub progress_percent: u8,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub result: Vec<PhaseResultView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub(crate) fn task_to_view(task: &Task) -> TaskView {
    TaskView {
        task_id: task.id,
        status: status_name(task),
        progress_percent: task.progress_percent,
        result: task
            .result
            .iter()
            .map(|r| PhaseResultView {
                phase: r.phase.to_string(),
                content: r.output.content.clone(),
                confidence: r.output.confidence,
                sources: r.output.sources.clone(),
                metadata: serde_json::to_value(&r.output.metadata)
                    .unwrap_or(serde_json::Value::Null),
                timestamp: r.timestamp,
            })
            .collect(),
        error: task.error.clone(),
        created_at: task.created_at,
        updated_at: task.updated_at,
    }
}

fn status_name(task: &Task) -> String {
    serde_json::to_value(task.status)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| format!("{:?}", task.status).to_lowercase())
}

/// Submit a task for orchestration
#[utoipa::path(
    post,
    path = "/api/v1/tasks",
    tag = "tasks",
    request_body = SubmitTaskRequest,
    responses(
        (status = 200, description = "Task accepted", body = SubmitTaskResponse),
        (status = 400, description = "Invalid agent selection")
    )
)]
pub async fn submit_task(
    Extension(queue): Extension<Arc<TaskQueue>>,
    Json(request): Json<SubmitTaskRequest>,
) -> impl IntoResponse {
    let selection = match request.selection() {
        Ok(selection) => selection,
        Err(message) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::<SubmitTaskResponse>::error(message)),
            );
        }
    };
    if request.prompt.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("prompt must not be empty")),
        );
    }

    match queue
        .enqueue(selection, request.input(), request.submitter.clone())
        .await
    {
        Ok(receipt) => (
            StatusCode::OK,
            Json(ApiResponse::success(SubmitTaskResponse {
                task_id: receipt.task_id,
                dispatch_id: receipt.dispatch_id,
            })),
        ),
        Err(e) => {
            error!(error = %e, "task submission failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(format!("failed to enqueue task: {e}"))),
            )
        }
    }
}

/// Poll task status and results
#[utoipa::path(
    get,
    path = "/api/v1/tasks/{id}",
    tag = "tasks",
    params(("id" = Uuid, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task status", body = TaskView),
        (status = 404, description = "Task not found")
    )
)]
pub async fn get_task(
    Extension(queue): Extension<Arc<TaskQueue>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match queue.get(id).await {
        Ok(Some(task)) => (
            StatusCode::OK,
            Json(ApiResponse::success(task_to_view(&task))),
        ),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<TaskView>::error("task not found")),
        ),
        Err(e) => {
            error!(task_id = %id, error = %e, "status lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(format!("status lookup failed: {e}"))),
            )
        }
    }
}

/// Cancel a task (cooperative, idempotent)
#[utoipa::path(
    delete,
    path = "/api/v1/tasks/{id}",
    tag = "tasks",
    params(("id" = Uuid, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Cancellation flag set", body = bool),
        (status = 404, description = "Task not found")
    )
)]
pub async fn cancel_task(
    Extension(queue): Extension<Arc<TaskQueue>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match queue.status(id).await {
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ApiResponse::<bool>::error("task not found")),
            );
        }
        Err(e) => {
            error!(task_id = %id, error = %e, "cancel lookup failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(format!("cancel failed: {e}"))),
            );
        }
        Ok(Some(_)) => {}
    }

    match queue.cancel(id).await {
        Ok(cancelled) => (StatusCode::OK, Json(ApiResponse::success(cancelled))),
        Err(e) => {
            error!(task_id = %id, error = %e, "cancel failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(format!("cancel failed: {e}"))),
            )
        }
    }
}

/// Create task routes
pub fn tasks_routes() -> Router {
    Router::new()
        .route("/api/v1/tasks", post(submit_task))
        .route("/api/v1/tasks/:id", get(get_task).delete(cancel_task))
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_core::TaskStatus;

    fn request(json: &str) -> SubmitTaskRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_single_agent_selection() {
        let req = request(r#"{"agent_type": "research", "prompt": "p"}"#);
        assert_eq!(
            req.selection().unwrap(),
            AgentSelection::Single(AgentKind::Research)
        );
    }

    #[test]
    fn test_council_selection() {
        let req = request(r#"{"agent_set": ["strategy", "risk"], "prompt": "p"}"#);
        assert_eq!(
            req.selection().unwrap(),
            AgentSelection::Council(vec![AgentKind::Strategy, AgentKind::Risk])
        );
    }

    #[test]
    fn test_selection_rejects_both_and_neither() {
        let both = request(r#"{"agent_type": "risk", "agent_set": ["market"], "prompt": "p"}"#);
        assert!(both.selection().is_err());

        let neither = request(r#"{"prompt": "p"}"#);
        assert!(neither.selection().is_err());
    }

    #[test]
    fn test_selection_rejects_single_member_set() {
        let req = request(r#"{"agent_set": ["market"], "prompt": "p"}"#);
        assert!(req.selection().unwrap_err().contains("at least 2"));
    }

    #[test]
    fn test_selection_rejects_unknown_kind() {
        let req = request(r#"{"agent_type": "astrology", "prompt": "p"}"#);
        assert!(req.selection().is_err());
    }

    #[test]
    fn test_task_view_serialization() {
        let mut task = Task::new(
            AgentSelection::Single(AgentKind::Market),
            TaskInput {
                prompt: "p".to_string(),
                ..Default::default()
            },
        );
        task.set_status(TaskStatus::Active);
        task.progress_percent = 40;

        let view = task_to_view(&task);
        assert_eq!(view.status, "active");
        let json = serde_json::to_string(&view).unwrap();
        assert!(json.contains("\"progress_percent\":40"));
        // Empty result list is omitted
        assert!(!json.contains("\"result\""));
    }
}
