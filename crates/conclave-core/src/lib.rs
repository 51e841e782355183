//! Conclave core
//!
//! The task orchestrator and everything it stands on:
//!
//! - [`task`] — task, phase and agent-output value types
//! - [`store`] — shared key-value store abstraction (Redis + in-memory)
//! - [`agents`] — the three-phase agent pipeline, one agent per kind
//! - [`council`] — multi-model gather / cross-critique / synthesize engine
//! - [`orchestrator`] — single- and multi-agent execution entry point
//! - [`queue`] — task intake with remote-push and local-pool dispatch
//! - [`dlq`] — bounded dead-letter list and its retry sweep
//! - [`progress`] — per-task ordered event buffer for live delivery
//! - [`shutdown`] — coordinated graceful shutdown
//!
//! The HTTP surface lives in the `conclave` binary crate; this crate is
//! transport-agnostic.

pub mod agents;
pub mod council;
pub mod dlq;
pub mod error;
pub mod orchestrator;
pub mod progress;
pub mod queue;
pub mod shutdown;
pub mod store;
pub mod task;
pub mod utils;

pub use agents::{agent_for, Agent, AgentKind};
pub use council::{CouncilConfig, CouncilEngine, CouncilOutcome, CouncilResponse, Critique};
pub use dlq::{DeadLetterQueue, DlqConfig, FailedTaskEnvelope, RedispatchFn, SweepStats};
pub use error::{Error, Result};
pub use orchestrator::Orchestrator;
pub use progress::{ProgressChannel, ProgressEvent, ProgressEventKind};
pub use queue::{
    sign_payload, verify_signature, DispatchMessage, EnqueueReceipt, ExecuteFn, LocalPoolConfig,
    QueueConfig, RemoteConfig, TaskQueue, SIGNATURE_HEADER,
};
pub use shutdown::ShutdownController;
pub use store::{InMemoryStore, KvStore, RedisStore, TaskRepository};
pub use task::{AgentOutput, AgentSelection, Phase, PhaseResult, Task, TaskInput, TaskStatus};
