//! Task queue with dual dispatch
//!
//! All task creation and mutation flows through the queue. `enqueue`
//! persists an initial `waiting` status before any dispatch path runs, then
//! prefers the remote push queue and falls back to the in-process worker
//! pool when the remote is unconfigured or its publish fails.

mod local;
mod remote;

pub use local::{ExecuteFn, LocalPoolConfig, LocalWorkerPool};
pub use remote::{
    sign_payload, verify_signature, DispatchMessage, RemoteConfig, RemotePublisher,
    SIGNATURE_HEADER,
};

use crate::error::Result;
use crate::store::TaskRepository;
use crate::task::{AgentSelection, Task, TaskInput, TaskStatus};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

/// Queue settings; `remote: None` means local-only dispatch
#[derive(Debug, Clone, Default)]
pub struct QueueConfig {
    /// Remote push-queue settings, when available
    pub remote: Option<RemoteConfig>,
    /// Local fallback pool settings
    pub local: LocalPoolConfig,
}

/// Returned by `enqueue`; the dispatch id tells the two paths apart
#[derive(Debug, Clone, Serialize)]
pub struct EnqueueReceipt {
    /// The created task
    pub task_id: Uuid,
    /// Remote dispatch id, or `local-{taskId}` on the fallback path
    pub dispatch_id: String,
}

/// Store-backed task queue; the single owner of task state transitions
pub struct TaskQueue {
    repo: TaskRepository,
    remote: Option<RemotePublisher>,
    local: LocalWorkerPool,
}

impl TaskQueue {
    /// Create a queue dispatching through the given executor
    pub fn new(repo: TaskRepository, executor: ExecuteFn, config: QueueConfig) -> Result<Self> {
        let remote = config.remote.map(RemotePublisher::new).transpose()?;
        let local = LocalWorkerPool::new(executor, config.local);
        Ok(Self {
            repo,
            remote,
            local,
        })
    }

    /// Create a task and dispatch it.
    ///
    /// The `waiting` status is written to the store before dispatch, so a
    /// status poll racing the dispatch never sees an unknown task.
    pub async fn enqueue(
        &self,
        selection: AgentSelection,
        input: TaskInput,
        submitter: Option<String>,
    ) -> Result<EnqueueReceipt> {
        let mut task = Task::new(selection, input);
        if let Some(submitter) = submitter {
            task = task.with_submitter(submitter);
        }
        self.repo.save(&task).await?;

        let task_id = task.id;
        let dispatch_id = self.dispatch(task).await?;
        info!(task_id = %task_id, dispatch_id = %dispatch_id, "task enqueued");
        Ok(EnqueueReceipt {
            task_id,
            dispatch_id,
        })
    }

    /// Dispatch an already-persisted task. Also the re-entry point for
    /// tasks restored by the dead-letter sweep.
    pub async fn dispatch(&self, task: Task) -> Result<String> {
        if let Some(remote) = &self.remote {
            match remote.publish(&task).await {
                Ok(dispatch_id) => return Ok(dispatch_id),
                Err(e) => {
                    warn!(task_id = %task.id, error = %e, "remote publish failed, using local pool");
                }
            }
        }
        let task_id = task.id;
        self.local.submit(task);
        Ok(format!("local-{task_id}"))
    }

    /// Task status, store-first with local job state as fallback
    pub async fn status(&self, task_id: Uuid) -> Result<Option<TaskStatus>> {
        if let Some(task) = self.repo.load(task_id).await? {
            return Ok(Some(task.status));
        }
        Ok(self.local.job_status(task_id))
    }

    /// Full task record, when known
    pub async fn get(&self, task_id: Uuid) -> Result<Option<Task>> {
        self.repo.load(task_id).await
    }

    /// Number of tasks the local pool currently tracks
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.local.in_flight()
    }

    /// Cancel a task: remove it from the local pool if still queued, and
    /// set the cooperative cancellation flag in the store. Idempotent.
    pub async fn cancel(&self, task_id: Uuid) -> Result<bool> {
        let removed = self.local.remove_pending(task_id);
        let flagged = self.repo.cancel(task_id).await?;
        if removed || flagged {
            info!(task_id = %task_id, "task cancelled");
        }
        Ok(removed || flagged)
    }
}
