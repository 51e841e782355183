//! Task orchestrator
//!
//! Drives single-agent pipelines and multi-agent fan-out behind one
//! [`Orchestrator::execute`] entry point. Both the remote-callback handler
//! and the local worker pool call it identically.
//!
//! Phase results are persisted as soon as each phase finishes, so a crash
//! after phase *k* preserves the first *k* results. Terminal failures are
//! handed to the dead-letter queue; cancellation is cooperative and checked
//! at dispatch time and again before results are emitted.

use crate::agents::{agent_for, Agent, AgentKind};
use crate::council::{CouncilConfig, CouncilEngine, CouncilResponse};
use crate::dlq::{DeadLetterQueue, FailedTaskEnvelope};
use crate::error::{Error, Result};
use crate::progress::{ProgressChannel, ProgressEventKind};
use crate::store::TaskRepository;
use crate::task::{AgentOutput, AgentSelection, Phase, PhaseResult, Task, TaskStatus};
use rand::seq::SliceRandom;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Progress percent after each completed phase
const PERCENT_AFTER: [(Phase, u8); 3] = [(Phase::Draft, 40), (Phase::Critique, 70), (Phase::Final, 100)];

/// Single- and multi-agent pipeline driver
pub struct Orchestrator {
    repo: TaskRepository,
    progress: ProgressChannel,
    engine: Arc<CouncilEngine>,
    council_config: CouncilConfig,
    dlq: Arc<DeadLetterQueue>,
}

impl Orchestrator {
    /// Create an orchestrator
    #[must_use]
    pub fn new(
        repo: TaskRepository,
        progress: ProgressChannel,
        engine: Arc<CouncilEngine>,
        council_config: CouncilConfig,
        dlq: Arc<DeadLetterQueue>,
    ) -> Self {
        Self {
            repo,
            progress,
            engine,
            council_config,
            dlq,
        }
    }

    /// Execute a dispatched task to completion.
    ///
    /// Idempotent per task id: a terminal task is returned unchanged, so
    /// at-least-once dispatch does not duplicate side effects.
    pub async fn execute(&self, task_id: Uuid) -> Result<Task> {
        let mut task = self.repo.require(task_id).await?;

        if task.status.is_terminal() {
            info!(task_id = %task_id, status = ?task.status, "re-dispatch of terminal task ignored");
            return Ok(task);
        }
        if self.repo.is_cancelled(task_id).await? {
            self.settle_cancelled(task_id).await?;
            return Err(Error::Cancelled(task_id));
        }

        task.set_status(TaskStatus::Active);
        task.progress_percent = 5;
        self.repo.save(&task).await?;
        self.progress
            .append(
                task_id,
                ProgressEventKind::Progress,
                serde_json::json!({ "status": "active", "percent": 5 }),
            )
            .await?;

        let run = match task.selection.clone() {
            AgentSelection::Single(kind) => self.run_single(&mut task, kind).await,
            AgentSelection::Council(kinds) => self.run_council(&mut task, kinds).await,
        };

        match run {
            Ok(()) => {
                // Cooperative cancellation: checked once more before the
                // result is emitted
                if self.repo.is_cancelled(task_id).await? {
                    self.settle_cancelled(task_id).await?;
                    return Err(Error::Cancelled(task_id));
                }
                task.set_status(TaskStatus::Completed);
                task.progress_percent = 100;
                self.repo.save(&task).await?;
                self.progress
                    .append(
                        task_id,
                        ProgressEventKind::Done,
                        serde_json::json!({ "phases": task.result.len() }),
                    )
                    .await?;
                info!(task_id = %task_id, phases = task.result.len(), "task completed");
                Ok(task)
            }
            Err(Error::Cancelled(id)) => {
                self.settle_cancelled(id).await?;
                Err(Error::Cancelled(id))
            }
            Err(e) => {
                self.fail_task(task, e).await
            }
        }
    }

    /// Persist the cancelled status for a task whose cancel flag was
    /// observed. The flag is authoritative: a stale writer may have put a
    /// non-terminal status back in the store, and an already-terminal
    /// record is left untouched.
    async fn settle_cancelled(&self, task_id: Uuid) -> Result<()> {
        if let Some(mut task) = self.repo.load(task_id).await? {
            if !task.status.is_terminal() {
                task.set_status(TaskStatus::Cancelled);
                self.repo.save(&task).await?;
                self.progress
                    .append(
                        task_id,
                        ProgressEventKind::Error,
                        serde_json::json!({ "status": "cancelled" }),
                    )
                    .await?;
                info!(task_id = %task_id, "task cancelled");
            }
        }
        Ok(())
    }

    /// Mark the task failed, surface the error to the stream, and queue it
    /// for bounded automatic retry.
    async fn fail_task(&self, mut task: Task, cause: Error) -> Result<Task> {
        let message = cause.to_string();
        error!(task_id = %task.id, error = %message, "task failed");

        task.set_status(TaskStatus::Failed);
        task.error = Some(message.clone());
        self.repo.save(&task).await?;
        self.progress
            .append(
                task.id,
                ProgressEventKind::Error,
                serde_json::json!({ "error": message }),
            )
            .await?;

        let envelope = FailedTaskEnvelope::new(task.clone(), message);
        if let Err(e) = self.dlq.push(envelope).await {
            // The task is already marked failed; losing the envelope only
            // loses the automatic retry
            warn!(task_id = %task.id, error = %e, "failed to enqueue dead-letter envelope");
        }
        Err(cause)
    }

    /// One agent, three phases, each persisted before the next starts
    async fn run_single(&self, task: &mut Task, kind: AgentKind) -> Result<()> {
        let agent = agent_for(kind, self.engine.clone(), self.council_config.clone());
        let progress = self.progress_fn(task.id);

        let draft = agent.run_draft(&task.input, &progress).await?;
        self.record_phase(task, Phase::Draft, draft.clone()).await?;

        let critique = agent.run_critique(&task.input, &draft, &progress).await?;
        self.record_phase(task, Phase::Critique, critique.clone())
            .await?;

        let fin = agent
            .run_final(&task.input, &draft, &critique, &progress)
            .await?;
        self.progress
            .append(
                task.id,
                ProgressEventKind::Chunk,
                serde_json::json!({ "content": fin.content }),
            )
            .await?;
        self.record_phase(task, Phase::Final, fin).await?;
        Ok(())
    }

    /// Fan out full pipelines for 2+ kinds, tolerate partial failure,
    /// cross-validate the survivors and record one combined final result.
    async fn run_council(&self, task: &mut Task, kinds: Vec<AgentKind>) -> Result<()> {
        if kinds.len() < 2 {
            return Err(Error::Configuration(
                "council selection needs at least 2 agent kinds".to_string(),
            ));
        }

        let pipelines = kinds.iter().map(|kind| {
            let agent = agent_for(*kind, self.engine.clone(), self.council_config.clone());
            let input = task.input.clone();
            let progress = self.progress_fn(task.id);
            let kind = *kind;
            async move {
                let result = Self::full_pipeline(agent.as_ref(), &input, &progress).await;
                (kind, result)
            }
        });

        let mut survivors: Vec<(AgentKind, AgentOutput)> = Vec::new();
        for (kind, result) in futures::future::join_all(pipelines).await {
            match result {
                Ok(output) => survivors.push((kind, output)),
                Err(e) => {
                    // An agent that throws is dropped, not fatal to the batch
                    warn!(task_id = %task.id, agent = %kind, error = %e, "agent dropped from batch");
                    self.progress
                        .append(
                            task.id,
                            ProgressEventKind::Thinking,
                            serde_json::json!({ "agent": kind.as_str(), "dropped": true }),
                        )
                        .await?;
                }
            }
        }

        if survivors.len() < 2 {
            return Err(Error::BelowThreshold {
                got: survivors.len(),
                need: 2,
            });
        }

        // Random permutation breaks systematic position bias in peer review
        survivors.shuffle(&mut rand::thread_rng());

        let agents_used: Vec<String> = survivors
            .iter()
            .map(|(kind, _)| kind.as_str().to_string())
            .collect();
        let responses: Vec<CouncilResponse> = survivors
            .into_iter()
            .map(|(kind, output)| {
                let mut response =
                    CouncilResponse::new(kind.as_str(), output.content, output.confidence);
                response.sources = output.sources;
                response
            })
            .collect();

        let mut config = self.council_config.clone();
        config.min_models = 2;
        let outcome = self
            .engine
            .cross_validate(responses, &task.input.prompt, &config)
            .await?;

        let mut output = AgentOutput {
            content: outcome.final_response.content.clone(),
            confidence: outcome.final_response.confidence,
            sources: outcome.final_response.sources.clone(),
            metadata: Default::default(),
        };
        // The consensus score is the critics' mean for the best response
        let consensus_score = outcome
            .metadata
            .get("bestScore")
            .cloned()
            .unwrap_or(serde_json::json!(0.0));
        output
            .metadata
            .insert("consensusScore".to_string(), consensus_score);
        output
            .metadata
            .insert("agentsUsed".to_string(), serde_json::json!(agents_used));
        output.metadata.insert(
            "averageScore".to_string(),
            serde_json::json!(outcome.consensus.average_score),
        );

        self.progress
            .append(
                task.id,
                ProgressEventKind::Chunk,
                serde_json::json!({ "content": output.content }),
            )
            .await?;
        self.record_phase(task, Phase::Final, output).await
    }

    /// Draft → critique → final for one agent, without task persistence;
    /// used by the multi-agent batch where only the combined result lands
    /// on the task.
    async fn full_pipeline(
        agent: &dyn Agent,
        input: &crate::task::TaskInput,
        progress: &crate::agents::ProgressFn,
    ) -> Result<AgentOutput> {
        let draft = agent.run_draft(input, progress).await?;
        let critique = agent.run_critique(input, &draft, progress).await?;
        agent.run_final(input, &draft, &critique, progress).await
    }

    /// Append a phase result to the task and persist immediately.
    ///
    /// The cancel flag is re-checked first so a save of the in-flight
    /// (Active) copy cannot clobber a Cancelled status a concurrent
    /// `cancel` already stored.
    async fn record_phase(&self, task: &mut Task, phase: Phase, output: AgentOutput) -> Result<()> {
        if self.repo.is_cancelled(task.id).await? {
            return Err(Error::Cancelled(task.id));
        }
        task.push_result(PhaseResult::new(phase, output));
        if let Some((_, percent)) = PERCENT_AFTER.iter().find(|(p, _)| *p == phase) {
            task.progress_percent = *percent;
        }
        self.repo.save(task).await?;
        self.progress
            .append(
                task.id,
                ProgressEventKind::Progress,
                serde_json::json!({ "phase": phase.to_string(), "percent": task.progress_percent }),
            )
            .await?;
        Ok(())
    }

    /// Observability-only callback bridging agent progress tags onto the
    /// task's event buffer. Fire-and-forget; must not affect control flow.
    fn progress_fn(&self, task_id: Uuid) -> impl Fn(&str) + Send + Sync {
        let progress = self.progress.clone();
        move |tag: &str| {
            let progress = progress.clone();
            let payload = serde_json::json!({ "message": tag });
            tokio::spawn(async move {
                let _ = progress
                    .append(task_id, ProgressEventKind::Thinking, payload)
                    .await;
            });
        }
    }
}
