//! Local fallback worker pool
//!
//! In-process dispatch path used when the remote push queue is unavailable.
//! Concurrency is bounded by a semaphore; jobs are keyed by task id, so a
//! second submission of the same id is a no-op retry rather than a
//! duplicate. A queued job can be removed before it starts; once running it
//! can only be stopped cooperatively through the cancellation flag.

use crate::error::{Error, Result};
use crate::task::{Task, TaskStatus};
use crate::utils::{retry_with_backoff, RetryConfig};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Callback executing one dispatched task to completion
pub type ExecuteFn = Arc<dyn Fn(Task) -> BoxFuture<'static, Result<Task>> + Send + Sync>;

/// Worker pool settings
#[derive(Debug, Clone)]
pub struct LocalPoolConfig {
    /// Maximum concurrently executing jobs
    pub max_concurrent: usize,
    /// Per-job attempts and backoff
    pub retry: RetryConfig,
}

impl Default for LocalPoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            retry: RetryConfig::default().with_initial_delay(Duration::from_millis(500)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
    Queued,
    Running,
}

/// Semaphore-bounded pool of task-id-keyed jobs
pub struct LocalWorkerPool {
    executor: ExecuteFn,
    semaphore: Arc<Semaphore>,
    jobs: Arc<Mutex<HashMap<Uuid, JobState>>>,
    retry: RetryConfig,
}

impl LocalWorkerPool {
    /// Create a pool around the given executor
    #[must_use]
    pub fn new(executor: ExecuteFn, config: LocalPoolConfig) -> Self {
        Self {
            executor,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            jobs: Arc::new(Mutex::new(HashMap::new())),
            retry: config.retry,
        }
    }

    /// Submit a task for background execution.
    ///
    /// Returns false when a job with the same task id is already queued or
    /// running; the duplicate submission is dropped.
    pub fn submit(&self, task: Task) -> bool {
        let task_id = task.id;
        {
            let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
            if jobs.contains_key(&task_id) {
                debug!(task_id = %task_id, "duplicate local submission ignored");
                return false;
            }
            jobs.insert(task_id, JobState::Queued);
        }

        let executor = self.executor.clone();
        let semaphore = self.semaphore.clone();
        let jobs = self.jobs.clone();
        let retry = self.retry.clone();
        tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };

            // A job removed while it waited for a slot never starts
            let started = {
                let mut jobs = jobs.lock().unwrap_or_else(|e| e.into_inner());
                match jobs.get_mut(&task_id) {
                    Some(state) => {
                        *state = JobState::Running;
                        true
                    }
                    None => false,
                }
            };
            if !started {
                debug!(task_id = %task_id, "job removed before start");
                return;
            }

            let result = retry_with_backoff(
                &retry,
                || executor(task.clone()),
                |e| !matches!(e, Error::Cancelled(_)),
            )
            .await;
            match result {
                Ok(done) => info!(task_id = %task_id, status = ?done.status, "local job finished"),
                Err(e) => {
                    warn!(task_id = %task_id, attempts = e.attempts, error = %e.last_error, "local job failed")
                }
            }

            jobs.lock().unwrap_or_else(|e| e.into_inner()).remove(&task_id);
        });
        true
    }

    /// Remove a queued job before it starts. Returns false when the job is
    /// already running or unknown.
    pub fn remove_pending(&self, task_id: Uuid) -> bool {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        if jobs.get(&task_id) == Some(&JobState::Queued) {
            jobs.remove(&task_id);
            debug!(task_id = %task_id, "queued job removed");
            true
        } else {
            false
        }
    }

    /// Status of a tracked job, normalized into the task status enum
    #[must_use]
    pub fn job_status(&self, task_id: Uuid) -> Option<TaskStatus> {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.get(&task_id).map(|state| match state {
            JobState::Queued => TaskStatus::Waiting,
            JobState::Running => TaskStatus::Active,
        })
    }

    /// Number of queued plus running jobs
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentKind;
    use crate::task::{AgentSelection, TaskInput};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;
    use tokio::time::{sleep, timeout};

    fn task() -> Task {
        Task::new(
            AgentSelection::Single(AgentKind::Research),
            TaskInput {
                prompt: "p".to_string(),
                ..Default::default()
            },
        )
    }

    fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig::default()
            .with_max_attempts(max_attempts)
            .with_initial_delay(Duration::from_millis(1))
            .with_jitter(false)
    }

    fn counting_executor(calls: Arc<AtomicUsize>, done: Arc<Notify>) -> ExecuteFn {
        Arc::new(move |task: Task| {
            let calls = calls.clone();
            let done = done.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                done.notify_one();
                Ok(task)
            })
        })
    }

    #[tokio::test]
    async fn test_submitted_job_executes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(Notify::new());
        let pool = LocalWorkerPool::new(
            counting_executor(calls.clone(), done.clone()),
            LocalPoolConfig::default(),
        );

        assert!(pool.submit(task()));
        timeout(Duration::from_secs(1), done.notified()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_duplicate_task_id_is_a_no_op() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());
        let gate_exec = gate.clone();
        let calls_exec = calls.clone();
        let executor: ExecuteFn = Arc::new(move |task: Task| {
            let calls = calls_exec.clone();
            let gate = gate_exec.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                gate.notified().await;
                Ok(task)
            })
        });
        let pool = LocalWorkerPool::new(executor, LocalPoolConfig::default());

        let t = task();
        assert!(pool.submit(t.clone()));
        assert!(!pool.submit(t.clone()));
        assert!(!pool.submit(t));

        gate.notify_waiters();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remove_pending_prevents_start() {
        let started = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let (started_exec, gate_exec, calls_exec) = (started.clone(), gate.clone(), calls.clone());
        let executor: ExecuteFn = Arc::new(move |task: Task| {
            let started = started_exec.clone();
            let gate = gate_exec.clone();
            let calls = calls_exec.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                started.notify_one();
                gate.notified().await;
                Ok(task)
            })
        });
        let pool = LocalWorkerPool::new(
            executor,
            LocalPoolConfig {
                max_concurrent: 1,
                retry: fast_retry(1),
            },
        );

        // First job occupies the single slot; second waits queued
        pool.submit(task());
        timeout(Duration::from_secs(1), started.notified()).await.unwrap();
        let second = task();
        pool.submit(second.clone());
        assert_eq!(pool.job_status(second.id), Some(TaskStatus::Waiting));

        assert!(pool.remove_pending(second.id));
        gate.notify_waiters();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(pool.job_status(second.id), None);
    }

    #[tokio::test]
    async fn test_remove_pending_cannot_stop_running_job() {
        let started = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());
        let (started_exec, gate_exec) = (started.clone(), gate.clone());
        let executor: ExecuteFn = Arc::new(move |task: Task| {
            let started = started_exec.clone();
            let gate = gate_exec.clone();
            Box::pin(async move {
                started.notify_one();
                gate.notified().await;
                Ok(task)
            })
        });
        let pool = LocalWorkerPool::new(executor, LocalPoolConfig::default());

        let t = task();
        pool.submit(t.clone());
        timeout(Duration::from_secs(1), started.notified()).await.unwrap();
        assert_eq!(pool.job_status(t.id), Some(TaskStatus::Active));
        assert!(!pool.remove_pending(t.id));
        gate.notify_waiters();
    }

    #[tokio::test]
    async fn test_failed_job_is_retried_with_bounded_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(Notify::new());
        let (calls_exec, done_exec) = (calls.clone(), done.clone());
        let executor: ExecuteFn = Arc::new(move |task: Task| {
            let calls = calls_exec.clone();
            let done = done_exec.clone();
            Box::pin(async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(Error::Store("transient".to_string()))
                } else {
                    done.notify_one();
                    Ok(task)
                }
            })
        });
        let pool = LocalWorkerPool::new(
            executor,
            LocalPoolConfig {
                max_concurrent: 2,
                retry: fast_retry(3),
            },
        );

        pool.submit(task());
        timeout(Duration::from_secs(1), done.notified()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancelled_job_is_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_exec = calls.clone();
        let executor: ExecuteFn = Arc::new(move |task: Task| {
            let calls = calls_exec.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Cancelled(task.id))
            })
        });
        let pool = LocalWorkerPool::new(
            executor,
            LocalPoolConfig {
                max_concurrent: 2,
                retry: fast_retry(3),
            },
        );

        pool.submit(task());
        sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(pool.in_flight(), 0);
    }
}
