//! Integration tests for Conclave
//!
//! These tests verify the integration between the crates:
//! - conclave-llm: Backend registry and mock backends
//! - conclave-core: Queue dispatch, orchestration, progress, dead-letter

use std::sync::Arc;
use std::time::Duration;

use conclave_core::{
    sign_payload, verify_signature, AgentKind, AgentSelection, CouncilConfig, CouncilEngine,
    DeadLetterQueue, DispatchMessage, DlqConfig, ExecuteFn, InMemoryStore, Orchestrator,
    ProgressChannel, ProgressEventKind, QueueConfig, Task, TaskInput, TaskQueue, TaskRepository,
    TaskStatus,
};
use conclave_llm::{BackendRegistry, MockBackend};
use tokio::time::sleep;

// ============================================================================
// Test rig: in-memory store + mock backends behind the real dispatch path
// ============================================================================

struct Rig {
    queue: Arc<TaskQueue>,
    repo: TaskRepository,
    progress: ProgressChannel,
    dlq: Arc<DeadLetterQueue>,
    backends: Vec<Arc<MockBackend>>,
}

fn rig(backend_names: &[&str]) -> Rig {
    let kv: Arc<dyn conclave_core::KvStore> = Arc::new(InMemoryStore::new());

    let mut registry = BackendRegistry::new();
    let mut backends = Vec::new();
    for name in backend_names {
        let backend = Arc::new(MockBackend::new(*name));
        registry.register(backend.clone());
        backends.push(backend);
    }

    let repo = TaskRepository::new(kv.clone());
    let progress = ProgressChannel::new(kv.clone());
    let dlq = Arc::new(DeadLetterQueue::new(kv, DlqConfig::default()));
    let orchestrator = Arc::new(Orchestrator::new(
        repo.clone(),
        progress.clone(),
        Arc::new(CouncilEngine::new(Arc::new(registry))),
        CouncilConfig::default(),
        dlq.clone(),
    ));

    // Same executor shape the server wires up
    let executor: ExecuteFn = Arc::new(move |task: Task| {
        let orchestrator = orchestrator.clone();
        Box::pin(async move { orchestrator.execute(task.id).await })
    });

    let queue = Arc::new(
        TaskQueue::new(repo.clone(), executor, QueueConfig::default())
            .expect("local-only queue config"),
    );

    let redispatch_queue = queue.clone();
    dlq.set_redispatch(Arc::new(move |task: Task| {
        let queue = redispatch_queue.clone();
        Box::pin(async move {
            queue.dispatch(task).await?;
            Ok(())
        })
    }));

    Rig {
        queue,
        repo,
        progress,
        dlq,
        backends,
    }
}

fn input(prompt: &str) -> TaskInput {
    TaskInput {
        prompt: prompt.to_string(),
        ..Default::default()
    }
}

/// Poll until the task reaches a terminal status. The local pool runs the
/// pipeline on background tasks, so tests wait rather than await directly.
async fn wait_for_terminal(repo: &TaskRepository, task_id: uuid::Uuid) -> Task {
    for _ in 0..200 {
        if let Some(task) = repo.load(task_id).await.expect("store read") {
            if task.status.is_terminal() {
                return task;
            }
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("task {task_id} did not settle");
}

// ============================================================================
// Dispatch → orchestration round trips
// ============================================================================

#[tokio::test]
async fn test_enqueue_runs_single_agent_to_completion() {
    let rig = rig(&["m1", "m2"]);

    let receipt = rig
        .queue
        .enqueue(
            AgentSelection::Single(AgentKind::Research),
            input("assess the seed round"),
            Some("integration".to_string()),
        )
        .await
        .expect("enqueue");
    assert!(receipt.dispatch_id.starts_with("local-"));

    let task = wait_for_terminal(&rig.repo, receipt.task_id).await;
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.progress_percent, 100);
    assert_eq!(task.result.len(), 3);
    assert_eq!(task.submitter.as_deref(), Some("integration"));
}

#[tokio::test]
async fn test_enqueue_runs_council_to_completion() {
    let rig = rig(&["m1", "m2", "m3"]);

    let receipt = rig
        .queue
        .enqueue(
            AgentSelection::Council(vec![AgentKind::Strategy, AgentKind::Risk]),
            input("should we expand to the EU market"),
            None,
        )
        .await
        .expect("enqueue");

    let task = wait_for_terminal(&rig.repo, receipt.task_id).await;
    assert_eq!(task.status, TaskStatus::Completed);
    assert!(!task.result.is_empty());

    // Every backend was consulted at least once
    for backend in &rig.backends {
        assert!(backend.call_count() > 0);
    }
}

#[tokio::test]
async fn test_progress_events_survive_completion() {
    let rig = rig(&["m1", "m2"]);

    let receipt = rig
        .queue
        .enqueue(
            AgentSelection::Single(AgentKind::Market),
            input("size the market"),
            None,
        )
        .await
        .expect("enqueue");
    wait_for_terminal(&rig.repo, receipt.task_id).await;

    let events = rig.progress.replay(receipt.task_id).await.expect("replay");
    assert!(!events.is_empty());
    assert_eq!(events[0].sequence, 0);
    for pair in events.windows(2) {
        assert!(pair[1].sequence > pair[0].sequence);
    }
    assert!(events.iter().any(|e| e.kind == ProgressEventKind::Done));
}

#[tokio::test]
async fn test_cancel_flag_reaches_the_pipeline() {
    let rig = rig(&["m1", "m2"]);

    // Persist without dispatching, then cancel before any execution
    let task = Task::new(
        AgentSelection::Single(AgentKind::Risk),
        input("never runs"),
    );
    rig.repo.save(&task).await.expect("save");

    assert!(rig.queue.cancel(task.id).await.expect("cancel"));
    assert_eq!(
        rig.queue.status(task.id).await.expect("status"),
        Some(TaskStatus::Cancelled)
    );

    // Dispatching the stale copy is a no-op on the cancelled task
    rig.queue.dispatch(task.clone()).await.expect("dispatch");
    sleep(Duration::from_millis(50)).await;
    let stored = rig.repo.load(task.id).await.expect("load").expect("exists");
    assert_eq!(stored.status, TaskStatus::Cancelled);
    for backend in &rig.backends {
        assert_eq!(backend.call_count(), 0);
    }
}

// ============================================================================
// Dead-letter capture and restoration
// ============================================================================

#[tokio::test]
async fn test_failed_task_is_dead_lettered_and_swept_back() {
    let rig = rig(&["m1", "m2"]);
    // Exhaust every backend so the council loses all its members
    for backend in &rig.backends {
        backend.push_error(conclave_llm::Error::Api("upstream 500".to_string()));
        backend.push_error(conclave_llm::Error::Api("upstream 500".to_string()));
    }

    let receipt = rig
        .queue
        .enqueue(
            AgentSelection::Council(vec![AgentKind::Research, AgentKind::Market]),
            input("doomed first attempt"),
            None,
        )
        .await
        .expect("enqueue");

    let failed = wait_for_terminal(&rig.repo, receipt.task_id).await;
    assert_eq!(failed.status, TaskStatus::Failed);
    assert!(failed.error.is_some());
    assert_eq!(rig.dlq.len().await.expect("dlq len"), 1);

    // Backends recovered; the sweep restores and redispatches the task
    let stats = rig.dlq.sweep().await.expect("sweep");
    assert_eq!(stats.restored, 1);
    assert_eq!(stats.discarded, 0);

    let recovered = wait_for_terminal(&rig.repo, receipt.task_id).await;
    assert_eq!(recovered.status, TaskStatus::Completed);
    assert_eq!(recovered.retry_count, 1);
    assert!(recovered.error.is_none());
    assert!(rig.dlq.is_empty().await.expect("dlq empty"));
}

// ============================================================================
// Signed dispatch payloads
// ============================================================================

#[test]
fn test_dispatch_message_signature_roundtrip() {
    let task = Task::new(
        AgentSelection::Single(AgentKind::Strategy),
        input("sign me"),
    );
    let message = DispatchMessage::from_task(&task);
    let body = serde_json::to_vec(&message).expect("serialize");

    let signature = sign_payload("shared-secret", &body).expect("sign");
    assert!(signature.starts_with("v1="));
    assert!(verify_signature(&["shared-secret"], &body, &signature));

    // Key rotation: verification succeeds as long as any configured key matches
    assert!(verify_signature(
        &["next-secret", "shared-secret"],
        &body,
        &signature
    ));
    assert!(!verify_signature(&["next-secret"], &body, &signature));

    // The payload round-trips losslessly
    let decoded: DispatchMessage = serde_json::from_slice(&body).expect("deserialize");
    assert_eq!(decoded.task_id, task.id);
    assert_eq!(decoded.input.prompt, "sign me");
}
