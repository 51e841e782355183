//! Task persistence over the shared store
//!
//! All task mutation flows through here; keys are derived from the task id
//! and expire after the retention window.

use super::KvStore;
use crate::error::{Error, Result};
use crate::task::{Task, TaskStatus};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Task status retention (24h)
pub const TASK_TTL_SECS: u64 = 24 * 3600;

/// Cancellation flag retention; outlives any plausible dispatch delay
const CANCEL_TTL_SECS: u64 = 24 * 3600;

/// Store-backed task repository
#[derive(Clone)]
pub struct TaskRepository {
    kv: Arc<dyn KvStore>,
}

impl TaskRepository {
    /// Create a repository over the given store
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn task_key(id: Uuid) -> String {
        format!("task:{id}")
    }

    fn cancel_key(id: Uuid) -> String {
        format!("cancel:{id}")
    }

    /// Persist a task under its id
    pub async fn save(&self, task: &Task) -> Result<()> {
        let json = serde_json::to_string(task)?;
        self.kv
            .set_ex(&Self::task_key(task.id), &json, TASK_TTL_SECS)
            .await?;
        debug!(task_id = %task.id, status = ?task.status, "task saved");
        Ok(())
    }

    /// Load a task by id
    pub async fn load(&self, id: Uuid) -> Result<Option<Task>> {
        match self.kv.get(&Self::task_key(id)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Load a task, failing if unknown
    pub async fn require(&self, id: Uuid) -> Result<Task> {
        self.load(id).await?.ok_or(Error::TaskNotFound(id))
    }

    /// Set the cooperative cancellation flag and mark the stored task
    /// cancelled if it has not already reached a terminal status.
    ///
    /// Returns false if the task id is unknown.
    pub async fn cancel(&self, id: Uuid) -> Result<bool> {
        let Some(mut task) = self.load(id).await? else {
            return Ok(false);
        };
        self.kv
            .set_ex(&Self::cancel_key(id), "1", CANCEL_TTL_SECS)
            .await?;
        if !task.status.is_terminal() {
            task.set_status(TaskStatus::Cancelled);
            self.save(&task).await?;
        }
        Ok(true)
    }

    /// Check the cooperative cancellation flag
    pub async fn is_cancelled(&self, id: Uuid) -> Result<bool> {
        Ok(self.kv.get(&Self::cancel_key(id)).await?.is_some())
    }
}
