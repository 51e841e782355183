//! Dead-letter queue
//!
//! Unrecoverably failed tasks land on a bounded list in the shared store
//! (oldest evicted on overflow). A periodic sweep atomically pops entries:
//! exhausted ones are discarded and counted, the rest are restored to
//! `Waiting` with `retry_count + 1` and handed back to the normal dispatch
//! path. The sweep is single-flight so an overlapping timer tick cannot
//! double-process entries.

use crate::error::Result;
use crate::store::{KvStore, TaskRepository};
use crate::task::{Task, TaskStatus};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DLQ_KEY: &str = "dlq";

/// Counter key for permanently failed tasks
const PERMANENT_KEY: &str = "dlq:permanent";

/// Envelope retention; generous compared to the sweep cadence
const DLQ_TTL_SECS: u64 = 7 * 24 * 3600;

/// Dead-letter configuration
#[derive(Debug, Clone)]
pub struct DlqConfig {
    /// Maximum automatic retries per task
    pub max_retries: u32,
    /// Sweep cadence
    pub sweep_interval: Duration,
    /// Entries processed per sweep, bounding sweep latency
    pub sweep_batch: usize,
    /// List capacity; the oldest envelope is evicted past this
    pub capacity: usize,
}

impl Default for DlqConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            sweep_interval: Duration::from_secs(600),
            sweep_batch: 20,
            capacity: 1000,
        }
    }
}

/// A failed task awaiting bounded automatic retry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedTaskEnvelope {
    /// The failed task as last persisted
    pub task: Task,
    /// The terminal error message
    pub error: String,
    /// When the failure occurred
    pub failed_at: DateTime<Utc>,
    /// Retry count at failure time, taken from the task's own counter
    pub retry_count: u32,
}

impl FailedTaskEnvelope {
    /// Wrap a failed task
    #[must_use]
    pub fn new(task: Task, error: impl Into<String>) -> Self {
        let retry_count = task.retry_count;
        Self {
            task,
            error: error.into(),
            failed_at: Utc::now(),
            retry_count,
        }
    }
}

/// Outcome of one sweep pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Tasks restored to `Waiting`
    pub restored: usize,
    /// Envelopes discarded as permanently failed
    pub discarded: usize,
    /// True when this tick was skipped because a sweep was still running
    pub skipped: bool,
}

/// Callback re-entering a restored task into the normal dispatch path
pub type RedispatchFn =
    Arc<dyn Fn(Task) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Bounded dead-letter list plus its retry sweep
pub struct DeadLetterQueue {
    kv: Arc<dyn KvStore>,
    repo: TaskRepository,
    config: DlqConfig,
    redispatch: OnceLock<RedispatchFn>,
    sweeping: AtomicBool,
}

impl DeadLetterQueue {
    /// Create a dead-letter queue over the given store
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>, config: DlqConfig) -> Self {
        let repo = TaskRepository::new(kv.clone());
        Self {
            kv,
            repo,
            config,
            redispatch: OnceLock::new(),
            sweeping: AtomicBool::new(false),
        }
    }

    /// Set the redispatch callback for restored tasks. The queue is wired
    /// after the orchestrator that owns this DLQ, hence the late binding;
    /// a second call is ignored.
    pub fn set_redispatch(&self, redispatch: RedispatchFn) {
        let _ = self.redispatch.set(redispatch);
    }

    /// Push a failed task envelope, evicting the oldest entry past capacity
    pub async fn push(&self, envelope: FailedTaskEnvelope) -> Result<()> {
        let json = serde_json::to_string(&envelope)?;
        self.kv
            .push_back_capped(DLQ_KEY, &json, self.config.capacity, DLQ_TTL_SECS)
            .await?;
        debug!(task_id = %envelope.task.id, retry_count = envelope.retry_count, "envelope dead-lettered");
        Ok(())
    }

    /// Current queue depth
    pub async fn len(&self) -> Result<usize> {
        self.kv.list_len(DLQ_KEY).await
    }

    /// Whether the queue is empty
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Count of permanently failed tasks since the counter last expired
    pub async fn permanent_failures(&self) -> Result<u64> {
        Ok(self
            .kv
            .get(PERMANENT_KEY)
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0))
    }

    /// One sweep pass: pop up to `sweep_batch` envelopes and restore or
    /// discard each. Single-flight; a pass that finds another still running
    /// returns immediately with `skipped` set.
    ///
    /// Each envelope is popped before it is processed, so a crash mid-sweep
    /// can re-enqueue a task once more than intended but never lose or
    /// double-process one.
    pub async fn sweep(&self) -> Result<SweepStats> {
        if self
            .sweeping
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("sweep already in flight, skipping tick");
            return Ok(SweepStats {
                skipped: true,
                ..Default::default()
            });
        }
        let result = self.sweep_inner().await;
        self.sweeping.store(false, Ordering::SeqCst);
        result
    }

    async fn sweep_inner(&self) -> Result<SweepStats> {
        let mut stats = SweepStats::default();

        for _ in 0..self.config.sweep_batch {
            let Some(json) = self.kv.pop_front(DLQ_KEY).await? else {
                break;
            };
            let envelope: FailedTaskEnvelope = match serde_json::from_str(&json) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(error = %e, "dropping undecodable dead-letter envelope");
                    continue;
                }
            };

            if envelope.retry_count >= self.config.max_retries {
                // Exhausted; the task stays in its terminal Failed state
                self.kv.incr(PERMANENT_KEY, DLQ_TTL_SECS).await?;
                stats.discarded += 1;
                info!(
                    task_id = %envelope.task.id,
                    retry_count = envelope.retry_count,
                    "retries exhausted, task permanently failed"
                );
                continue;
            }

            let mut task = envelope.task;
            task.retry_count = envelope.retry_count + 1;
            task.set_status(TaskStatus::Waiting);
            task.error = None;
            self.repo.save(&task).await?;
            stats.restored += 1;
            info!(task_id = %task.id, retry_count = task.retry_count, "task restored for retry");

            if let Some(redispatch) = self.redispatch.get() {
                if let Err(e) = redispatch(task.clone()).await {
                    warn!(task_id = %task.id, error = %e, "redispatch of restored task failed");
                }
            }
        }

        if stats.restored > 0 || stats.discarded > 0 {
            info!(restored = stats.restored, discarded = stats.discarded, "dead-letter sweep finished");
        }
        Ok(stats)
    }

    /// Background sweep loop; runs until the token is cancelled
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(interval_secs = self.config.sweep_interval.as_secs(), "dead-letter sweep started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.sweep_interval) => {
                    if let Err(e) = self.sweep().await {
                        warn!(error = %e, "dead-letter sweep failed");
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("dead-letter sweep shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentKind;
    use crate::store::InMemoryStore;
    use crate::task::{AgentSelection, TaskInput};

    fn dlq() -> (DeadLetterQueue, Arc<InMemoryStore>) {
        let kv = Arc::new(InMemoryStore::new());
        (DeadLetterQueue::new(kv.clone(), DlqConfig::default()), kv)
    }

    fn failed_task(retry_count: u32) -> FailedTaskEnvelope {
        let mut task = Task::new(
            AgentSelection::Single(AgentKind::Research),
            TaskInput {
                prompt: "p".to_string(),
                ..Default::default()
            },
        );
        task.retry_count = retry_count;
        task.set_status(TaskStatus::Failed);
        FailedTaskEnvelope::new(task, "model error: boom")
    }

    #[tokio::test]
    async fn test_restorable_envelope_restored_exactly_once() {
        let (dlq, kv) = dlq();
        let envelope = failed_task(1);
        let task_id = envelope.task.id;
        dlq.push(envelope).await.unwrap();

        let stats = dlq.sweep().await.unwrap();
        assert_eq!(stats.restored, 1);
        assert_eq!(stats.discarded, 0);
        assert!(dlq.is_empty().await.unwrap());

        let repo = TaskRepository::new(kv);
        let restored = repo.load(task_id).await.unwrap().unwrap();
        assert_eq!(restored.status, TaskStatus::Waiting);
        assert_eq!(restored.retry_count, 2);
        assert_eq!(restored.error, None);

        // A second sweep finds nothing
        let stats = dlq.sweep().await.unwrap();
        assert_eq!(stats, SweepStats::default());
    }

    #[tokio::test]
    async fn test_exhausted_envelope_discarded_never_restored() {
        let (dlq, kv) = dlq();
        let envelope = failed_task(3);
        let task_id = envelope.task.id;
        dlq.push(envelope).await.unwrap();

        let stats = dlq.sweep().await.unwrap();
        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.restored, 0);
        assert_eq!(dlq.permanent_failures().await.unwrap(), 1);

        // The stored task keeps its terminal Failed status
        let repo = TaskRepository::new(kv);
        let task = repo.load(task_id).await.unwrap();
        assert!(task.is_none() || task.unwrap().status == TaskStatus::Failed);
    }

    #[tokio::test]
    async fn test_sweep_batch_bounds_one_pass() {
        let kv = Arc::new(InMemoryStore::new());
        let config = DlqConfig {
            sweep_batch: 2,
            ..Default::default()
        };
        let dlq = DeadLetterQueue::new(kv, config);

        for _ in 0..5 {
            dlq.push(failed_task(0)).await.unwrap();
        }

        let stats = dlq.sweep().await.unwrap();
        assert_eq!(stats.restored, 2);
        assert_eq!(dlq.len().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_redispatch_called_for_restored_tasks() {
        let kv = Arc::new(InMemoryStore::new());
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_cb = seen.clone();
        let redispatch: RedispatchFn = Arc::new(move |task: Task| {
            let seen = seen_cb.clone();
            Box::pin(async move {
                seen.lock().unwrap().push(task.id);
                Ok(())
            })
        });
        let dlq = DeadLetterQueue::new(kv, DlqConfig::default());
        dlq.set_redispatch(redispatch);

        dlq.push(failed_task(0)).await.unwrap();
        dlq.push(failed_task(3)).await.unwrap(); // exhausted, no redispatch
        dlq.sweep().await.unwrap();

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_count_is_monotonic_across_sweeps() {
        let (dlq, kv) = dlq();
        let envelope = failed_task(0);
        let task_id = envelope.task.id;
        dlq.push(envelope).await.unwrap();
        dlq.sweep().await.unwrap();

        let repo = TaskRepository::new(kv);
        let mut task = repo.load(task_id).await.unwrap().unwrap();
        assert_eq!(task.retry_count, 1);

        // Fail again and sweep again: the counter keeps climbing
        task.set_status(TaskStatus::Failed);
        dlq.push(FailedTaskEnvelope::new(task, "again")).await.unwrap();
        dlq.sweep().await.unwrap();
        let task = repo.load(task_id).await.unwrap().unwrap();
        assert_eq!(task.retry_count, 2);
    }
}
