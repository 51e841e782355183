//! Task, phase and agent-output value types
//!
//! A [`Task`] is one client-submitted unit of orchestrated work. It is
//! created once by the queue, mutated only through the queue/orchestrator,
//! and frozen once it reaches a terminal status.

use crate::agents::AgentKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Task lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Accepted, not yet picked up by a dispatch path
    Waiting,
    /// A dispatch path is executing the pipeline
    Active,
    /// Finished successfully; result is final
    Completed,
    /// Failed; terminal once retries are exhausted
    Failed,
    /// Cancelled by the client; terminal
    Cancelled,
}

impl TaskStatus {
    /// Whether the status admits no further transitions.
    ///
    /// `Failed` is terminal only after retry exhaustion; the dead-letter
    /// sweep may still restore a failed task to `Waiting`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Which agent(s) a task runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentSelection {
    /// One agent, full three-phase pipeline
    Single(AgentKind),
    /// Two or more agents fanned out and cross-validated
    Council(Vec<AgentKind>),
}

impl AgentSelection {
    /// All agent kinds named by this selection
    #[must_use]
    pub fn kinds(&self) -> Vec<AgentKind> {
        match self {
            Self::Single(kind) => vec![*kind],
            Self::Council(kinds) => kinds.clone(),
        }
    }
}

/// Client-supplied task input
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskInput {
    /// The user's prompt
    pub prompt: String,
    /// Session the task belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Business entity the task concerns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_id: Option<String>,
    /// Supporting document URIs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub documents: Vec<String>,
}

/// Pipeline phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// First pass over the input
    Draft,
    /// Critique of the draft
    Critique,
    /// Final answer incorporating the critique
    Final,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Critique => write!(f, "critique"),
            Self::Final => write!(f, "final"),
        }
    }
}

/// Output of one agent phase. Pure value type, no identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentOutput {
    /// Generated text
    pub content: String,
    /// Self-reported confidence, 0..1
    pub confidence: f64,
    /// Source URIs consulted
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    /// Free-form metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// One phase's recorded result. Appended in execution order, never reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseResult {
    /// Which phase produced the output
    pub phase: Phase,
    /// The phase output
    pub output: AgentOutput,
    /// When the phase finished
    pub timestamp: DateTime<Utc>,
}

impl PhaseResult {
    /// Record a phase result stamped now
    #[must_use]
    pub fn new(phase: Phase, output: AgentOutput) -> Self {
        Self {
            phase,
            output,
            timestamp: Utc::now(),
        }
    }
}

/// One client-submitted unit of orchestrated work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Task identifier; also the dispatch dedup key
    pub id: Uuid,
    /// Agent(s) to run
    pub selection: AgentSelection,
    /// Client input
    pub input: TaskInput,
    /// Lifecycle status
    pub status: TaskStatus,
    /// Coarse progress, 0..=100
    pub progress_percent: u8,
    /// Phase results in execution order
    #[serde(default)]
    pub result: Vec<PhaseResult>,
    /// Terminal error, if failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Dead-letter restore count. Monotonic non-decreasing; the single
    /// source of truth for retry-exhaustion decisions.
    pub retry_count: u32,
    /// Submitter identity (observability only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitter: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new waiting task
    #[must_use]
    pub fn new(selection: AgentSelection, input: TaskInput) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            selection,
            input,
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

    /// Attach the submitter identity
    #[must_use]
    pub fn with_submitter(mut self, submitter: impl Into<String>) -> Self {
        self.submitter = Some(submitter.into());
        self
    }

    /// Update status and touch `updated_at`
    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Append a phase result and touch `updated_at`
    pub fn push_result(&mut self, result: PhaseResult) {
        self.result.push(result);
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentKind;

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&TaskStatus::Waiting).unwrap();
        assert_eq!(json, "\"waiting\"");
        let status: TaskStatus = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(status, TaskStatus::Completed);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Waiting.is_terminal());
        assert!(!TaskStatus::Active.is_terminal());
    }

    #[test]
    fn test_task_roundtrip() {
        let task = Task::new(
            AgentSelection::Council(vec![AgentKind::Research, AgentKind::Strategy]),
            TaskInput {
                prompt: "evaluate the pitch".to_string(),
                session_id: Some("s-1".to_string()),
                ..Default::default()
            },
        )
        .with_submitter("user-7");

        let json = serde_json::to_string(&task).unwrap();
        let back: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, task.id);
        assert_eq!(back.selection, task.selection);
        assert_eq!(back.status, TaskStatus::Waiting);
        assert_eq!(back.retry_count, 0);
    }

    #[test]
    fn test_selection_kinds() {
        let single = AgentSelection::Single(AgentKind::Risk);
        assert_eq!(single.kinds(), vec![AgentKind::Risk]);

        let council = AgentSelection::Council(vec![AgentKind::Research, AgentKind::Market]);
        assert_eq!(council.kinds().len(), 2);
    }
}
