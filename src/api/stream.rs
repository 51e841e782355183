//! SSE progress streaming
//!
//! GET /api/v1/tasks/:id/stream - Live progress events for a task
//!
//! The stream replays the buffered events first, then polls the progress
//! buffer until a terminal event is observed, the task reaches a terminal
//! status, or the hard duration ceiling is hit. Sequence numbers in the
//! payloads let clients detect gaps after a reconnect.

use axum::{
    extract::Path,
    http::StatusCode,
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Extension, Json, Router,
};
use conclave_core::{
    ProgressChannel, ProgressEvent, ProgressEventKind, TaskRepository, TaskStatus,
};
use futures::stream::{self, Stream};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tracing::warn;
use uuid::Uuid;

use super::{ApiResponse, StreamSettings};

/// SSE event name for a progress event kind
fn event_name(kind: ProgressEventKind) -> &'static str {
    match kind {
        ProgressEventKind::Connected => "connected",
        ProgressEventKind::Progress => "progress",
        ProgressEventKind::Thinking => "thinking",
        ProgressEventKind::Chunk => "chunk",
        ProgressEventKind::Done => "done",
        ProgressEventKind::Error => "error",
    }
}

fn encode(event: &ProgressEvent) -> SseEvent {
    let data = json!({
        "task_id": event.task_id,
        "sequence": event.sequence,
        "payload": event.payload,
        "timestamp": event.timestamp,
    });
    SseEvent::default()
        .event(event_name(event.kind))
        .data(data.to_string())
}

struct StreamState {
    progress: ProgressChannel,
    repo: TaskRepository,
    task_id: Uuid,
    /// Last sequence emitted, `None` until the first event is seen
    cursor: Option<u64>,
    pending: VecDeque<SseEvent>,
    poll_interval: std::time::Duration,
    deadline: Instant,
    first_poll: bool,
    closed: bool,
}

impl StreamState {
    fn absorb(&mut self, events: Vec<ProgressEvent>) {
        for event in events {
            self.cursor = Some(event.sequence);
            if matches!(
                event.kind,
                ProgressEventKind::Done | ProgressEventKind::Error
            ) {
                self.closed = true;
            }
            self.pending.push_back(encode(&event));
            if self.closed {
                break;
            }
        }
    }

    /// Terminal status without a terminal event in the buffer, e.g. a
    /// cancellation that landed between polls
    fn synthesize_terminal(&mut self, status: TaskStatus) {
        let (kind, payload) = match status {
            TaskStatus::Completed => (ProgressEventKind::Done, json!({"status": "completed"})),
            TaskStatus::Failed => (ProgressEventKind::Error, json!({"status": "failed"})),
            TaskStatus::Cancelled => (ProgressEventKind::Error, json!({"status": "cancelled"})),
            TaskStatus::Waiting | TaskStatus::Active => return,
        };
        self.pending.push_back(
            SseEvent::default()
                .event(event_name(kind))
                .data(payload.to_string()),
        );
        self.closed = true;
    }
}

fn event_stream(state: StreamState) -> impl Stream<Item = Result<SseEvent, axum::Error>> {
    stream::unfold(Some(state), |state| async move {
        let mut state = state?;
        loop {
            if let Some(event) = state.pending.pop_front() {
                let next = if state.closed && state.pending.is_empty() {
                    None
                } else {
                    Some(state)
                };
                return Some((Ok(event), next));
            }
            if state.closed {
                return None;
            }

            if state.first_poll {
                state.first_poll = false;
            } else {
                sleep(state.poll_interval).await;
            }

            if Instant::now() >= state.deadline {
                state.pending.push_back(
                    SseEvent::default()
                        .event("error")
                        .data(json!({"status": "stream_expired"}).to_string()),
                );
                state.closed = true;
                continue;
            }

            let fetched = match state.cursor {
                None => state.progress.replay(state.task_id).await,
                Some(cursor) => state.progress.events_after(state.task_id, cursor).await,
            };
            match fetched {
                Ok(events) => {
                    let saw_events = !events.is_empty();
                    state.absorb(events);
                    if saw_events {
                        continue;
                    }
                }
                Err(e) => {
                    warn!(task_id = %state.task_id, error = %e, "event replay failed");
                }
            }

            // No new events; fall back to the status record so a stream over
            // an already-terminal task still closes promptly.
            match state.repo.load(state.task_id).await {
                Ok(Some(task)) if task.status.is_terminal() => {
                    state.synthesize_terminal(task.status);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(task_id = %state.task_id, error = %e, "status check failed");
                }
            }
        }
    })
}

/// Stream task progress over SSE
#[utoipa::path(
    get,
    path = "/api/v1/tasks/{id}/stream",
    tag = "tasks",
    params(("id" = Uuid, Path, description = "Task ID")),
    responses(
        (status = 200, description = "SSE event stream"),
        (status = 404, description = "Task not found")
    )
)]
pub async fn stream_task(
    Extension(repo): Extension<TaskRepository>,
    Extension(progress): Extension<ProgressChannel>,
    Extension(settings): Extension<Arc<StreamSettings>>,
    Path(id): Path<Uuid>,
) -> Response {
    let task = match repo.load(id).await {
        Ok(Some(task)) => task,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ApiResponse::<()>::error("task not found")),
            )
                .into_response();
        }
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<()>::error(format!("stream setup failed: {e}"))),
            )
                .into_response();
        }
    };

    let preamble = SseEvent::default().event("connected").data(
        json!({
            "task_id": id,
            "status": task.status,
        })
        .to_string(),
    );
    let mut pending = VecDeque::new();
    pending.push_back(preamble);

    let state = StreamState {
        progress,
        repo,
        task_id: id,
        cursor: None,
        pending,
        poll_interval: settings.poll_interval,
        deadline: Instant::now() + settings.max_duration,
        first_poll: true,
        closed: false,
    };

    Sse::new(event_stream(state))
        .keep_alive(KeepAlive::new().interval(settings.heartbeat))
        .into_response()
}

/// Create stream routes
pub fn stream_routes() -> Router {
    Router::new().route("/api/v1/tasks/:id/stream", get(stream_task))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_cover_all_kinds() {
        assert_eq!(event_name(ProgressEventKind::Connected), "connected");
        assert_eq!(event_name(ProgressEventKind::Chunk), "chunk");
        assert_eq!(event_name(ProgressEventKind::Done), "done");
        assert_eq!(event_name(ProgressEventKind::Error), "error");
    }

    #[test]
    fn test_absorb_closes_on_terminal_event() {
        let kv: Arc<dyn conclave_core::KvStore> = Arc::new(conclave_core::InMemoryStore::new());
        let mut state = StreamState {
            progress: ProgressChannel::new(kv.clone()),
            repo: TaskRepository::new(kv),
            task_id: Uuid::new_v4(),
            cursor: None,
            pending: VecDeque::new(),
            poll_interval: std::time::Duration::from_millis(1),
            deadline: Instant::now() + std::time::Duration::from_secs(1),
            first_poll: true,
            closed: false,
        };
        let event = |sequence, kind| ProgressEvent {
            task_id: state.task_id,
            sequence,
            kind,
            payload: json!({}),
            timestamp: chrono::Utc::now(),
        };
        state.absorb(vec![
            event(0, ProgressEventKind::Progress),
            event(1, ProgressEventKind::Done),
            event(2, ProgressEventKind::Chunk),
        ]);
        // The terminal event ends the stream; nothing after it is queued
        assert!(state.closed);
        assert_eq!(state.pending.len(), 2);
        assert_eq!(state.cursor, Some(1));
    }

    #[test]
    fn test_synthesize_terminal_ignores_live_statuses() {
        let kv: Arc<dyn conclave_core::KvStore> = Arc::new(conclave_core::InMemoryStore::new());
        let mut state = StreamState {
            progress: ProgressChannel::new(kv.clone()),
            repo: TaskRepository::new(kv),
            task_id: Uuid::new_v4(),
            cursor: None,
            pending: VecDeque::new(),
            poll_interval: std::time::Duration::from_millis(1),
            deadline: Instant::now() + std::time::Duration::from_secs(1),
            first_poll: true,
            closed: false,
        };
        state.synthesize_terminal(TaskStatus::Active);
        assert!(!state.closed);
        assert!(state.pending.is_empty());

        state.synthesize_terminal(TaskStatus::Cancelled);
        assert!(state.closed);
        assert_eq!(state.pending.len(), 1);
    }
}
