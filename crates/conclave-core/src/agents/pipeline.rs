//! Council-backed agent implementation
//!
//! Each phase is one full council pass: gather, cross-critique, synthesize.
//! The agent only shapes the prompts; consensus mechanics live in the
//! council engine.

use super::{phase_system_prompt, Agent, AgentKind, ProgressFn};
use crate::council::{CouncilConfig, CouncilEngine, CouncilOutcome};
use crate::error::Result;
use crate::task::{AgentOutput, Phase, TaskInput};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Agent whose phases each run one council pass
pub struct CouncilAgent {
    kind: AgentKind,
    engine: Arc<CouncilEngine>,
    config: CouncilConfig,
}

impl CouncilAgent {
    /// Create an agent of the given kind
    #[must_use]
    pub fn new(kind: AgentKind, engine: Arc<CouncilEngine>, config: CouncilConfig) -> Self {
        Self {
            kind,
            engine,
            config,
        }
    }

    fn base_prompt(input: &TaskInput) -> String {
        let mut prompt = input.prompt.clone();
        if !input.documents.is_empty() {
            prompt.push_str("\n\nSupporting documents:\n");
            for doc in &input.documents {
                prompt.push_str("- ");
                prompt.push_str(doc);
                prompt.push('\n');
            }
        }
        prompt
    }

    async fn run_phase(
        &self,
        phase: Phase,
        user_prompt: String,
        progress: &ProgressFn,
    ) -> Result<AgentOutput> {
        progress(&format!("{}: {} council pass started", self.kind, phase));
        let system = phase_system_prompt(self.kind, phase);
        let outcome = self.engine.run(&system, &user_prompt, &self.config).await?;
        progress(&format!(
            "{}: {} complete ({} responses, {} critiques)",
            self.kind,
            phase,
            outcome.responses.len(),
            outcome.critiques.len()
        ));
        debug!(agent = %self.kind, phase = %phase, score = outcome.consensus.average_score, "phase finished");
        Ok(Self::to_output(outcome))
    }

    fn to_output(outcome: CouncilOutcome) -> AgentOutput {
        let mut metadata = HashMap::new();
        metadata.insert(
            "averageScore".to_string(),
            serde_json::json!(outcome.consensus.average_score),
        );
        if let Some(sources) = outcome.metadata.get("sourcesUsed") {
            metadata.insert("backendsUsed".to_string(), sources.clone());
        }
        AgentOutput {
            confidence: outcome.final_response.confidence,
            sources: outcome.final_response.sources.clone(),
            content: outcome.final_response.content,
            metadata,
        }
    }
}

#[async_trait::async_trait]
impl Agent for CouncilAgent {
    fn kind(&self) -> AgentKind {
        self.kind
    }

    async fn run_draft(&self, input: &TaskInput, progress: &ProgressFn) -> Result<AgentOutput> {
        self.run_phase(Phase::Draft, Self::base_prompt(input), progress)
            .await
    }

    async fn run_critique(
        &self,
        input: &TaskInput,
        draft: &AgentOutput,
        progress: &ProgressFn,
    ) -> Result<AgentOutput> {
        let prompt = format!(
            "{}\n\n--- Draft to critique ---\n{}",
            Self::base_prompt(input),
            draft.content
        );
        self.run_phase(Phase::Critique, prompt, progress).await
    }

    async fn run_final(
        &self,
        input: &TaskInput,
        draft: &AgentOutput,
        critique: &AgentOutput,
        progress: &ProgressFn,
    ) -> Result<AgentOutput> {
        let prompt = format!(
            "{}\n\n--- Draft ---\n{}\n\n--- Critique ---\n{}",
            Self::base_prompt(input),
            draft.content,
            critique.content
        );
        self.run_phase(Phase::Final, prompt, progress).await
    }
}
