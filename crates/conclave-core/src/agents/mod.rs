//! Agent pipeline
//!
//! One agent kind per advisory discipline, each running the same fixed
//! three-phase pipeline (draft → critique → final) against the council
//! engine. The kinds form a closed enum: adding one forces every lookup
//! table and prompt match in this module to be extended at compile time.

mod pipeline;

pub use pipeline::CouncilAgent;

use crate::council::{CouncilConfig, CouncilEngine};
use crate::error::Result;
use crate::task::{AgentOutput, Phase, TaskInput};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Observability-only progress callback. Implementations may call it any
/// number of times during any phase; it must not affect control flow.
pub type ProgressFn = dyn Fn(&str) + Send + Sync;

/// The closed set of agent kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Market and competitor research
    Research,
    /// Positioning and go-to-market strategy
    Strategy,
    /// Market sizing and traction analysis
    Market,
    /// Risk and diligence review
    Risk,
}

impl AgentKind {
    /// Every kind, in a stable order
    pub const ALL: &'static [AgentKind] = &[
        AgentKind::Research,
        AgentKind::Strategy,
        AgentKind::Market,
        AgentKind::Risk,
    ];

    /// Stable string form (matches the wire format)
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Strategy => "strategy",
            Self::Market => "market",
            Self::Risk => "risk",
        }
    }

    /// The discipline description woven into every phase prompt
    fn charter(&self) -> &'static str {
        match self {
            Self::Research => {
                "an analyst researching the venture's space: competitors, \
                 prior art, comparable companies and relevant facts"
            }
            Self::Strategy => {
                "a strategist assessing positioning, differentiation and \
                 go-to-market approach"
            }
            Self::Market => {
                "a market analyst estimating market size, timing and \
                 traction signals"
            }
            Self::Risk => {
                "a diligence reviewer surfacing risks, weak assumptions and \
                 failure modes"
            }
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AgentKind {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "research" => Ok(Self::Research),
            "strategy" => Ok(Self::Strategy),
            "market" => Ok(Self::Market),
            "risk" => Ok(Self::Risk),
            other => Err(crate::error::Error::Configuration(format!(
                "unknown agent kind: {other}"
            ))),
        }
    }
}

/// A three-phase agent. Phases run strictly in order; each takes the prior
/// phase's output.
#[async_trait::async_trait]
pub trait Agent: Send + Sync {
    /// Which kind this agent is
    fn kind(&self) -> AgentKind;

    /// First pass over the input
    async fn run_draft(&self, input: &TaskInput, progress: &ProgressFn) -> Result<AgentOutput>;

    /// Critique the draft
    async fn run_critique(
        &self,
        input: &TaskInput,
        draft: &AgentOutput,
        progress: &ProgressFn,
    ) -> Result<AgentOutput>;

    /// Produce the final answer from draft and critique
    async fn run_final(
        &self,
        input: &TaskInput,
        draft: &AgentOutput,
        critique: &AgentOutput,
        progress: &ProgressFn,
    ) -> Result<AgentOutput>;
}

/// Exhaustive kind → agent lookup table
#[must_use]
pub fn agent_for(
    kind: AgentKind,
    engine: Arc<CouncilEngine>,
    config: CouncilConfig,
) -> Box<dyn Agent> {
    match kind {
        AgentKind::Research => Box::new(CouncilAgent::new(AgentKind::Research, engine, config)),
        AgentKind::Strategy => Box::new(CouncilAgent::new(AgentKind::Strategy, engine, config)),
        AgentKind::Market => Box::new(CouncilAgent::new(AgentKind::Market, engine, config)),
        AgentKind::Risk => Box::new(CouncilAgent::new(AgentKind::Risk, engine, config)),
    }
}

/// System prompt for one phase of one kind
fn phase_system_prompt(kind: AgentKind, phase: Phase) -> String {
    match phase {
        Phase::Draft => format!(
            "You are {}. Produce a focused first-pass analysis of the \
             submitted startup material. Be concrete and cite what you rely on.",
            kind.charter()
        ),
        Phase::Critique => format!(
            "You are {}. You wrote the draft below earlier. Critique it: \
             list gaps, unsupported claims and what to strengthen.",
            kind.charter()
        ),
        Phase::Final => format!(
            "You are {}. Rewrite the draft into a final answer that \
             addresses every point of the critique.",
            kind.charter()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_kind_string_roundtrip() {
        for kind in AgentKind::ALL {
            assert_eq!(AgentKind::from_str(kind.as_str()).unwrap(), *kind);
        }
        assert!(AgentKind::from_str("florist").is_err());
    }

    #[test]
    fn test_kind_serde_matches_as_str() {
        let json = serde_json::to_string(&AgentKind::Risk).unwrap();
        assert_eq!(json, "\"risk\"");
    }

    #[test]
    fn test_phase_prompts_are_distinct() {
        let draft = phase_system_prompt(AgentKind::Research, Phase::Draft);
        let critique = phase_system_prompt(AgentKind::Research, Phase::Critique);
        let fin = phase_system_prompt(AgentKind::Research, Phase::Final);
        assert_ne!(draft, critique);
        assert_ne!(critique, fin);
    }
}
