//! Council consensus engine
//!
//! Gathers independent answers to one prompt from several model backends,
//! has the models cross-critique each other's anonymized answers, scores
//! them, and synthesizes one final answer.

mod engine;

pub use engine::CouncilEngine;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Council run parameters
#[derive(Debug, Clone)]
pub struct CouncilConfig {
    /// Minimum surviving responses; the run fails below this
    pub min_models: usize,
    /// Maximum backends polled (and maximum critics)
    pub max_models: usize,
    /// Sampling temperature for gather calls
    pub temperature: f32,
    /// Token ceiling per call
    pub max_tokens: u32,
    /// Per-call timeout
    pub timeout: Duration,
    /// Blend top responses with one extra model call instead of returning
    /// the best response verbatim
    pub quality_synthesis: bool,
}

impl Default for CouncilConfig {
    fn default() -> Self {
        Self {
            min_models: 2,
            max_models: 4,
            temperature: 0.7,
            max_tokens: 2048,
            timeout: Duration::from_secs(60),
            quality_synthesis: false,
        }
    }
}

/// One model's answer within a council run. Transient, scoped to the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilResponse {
    /// Response identity, referenced by critiques
    pub id: Uuid,
    /// Producing backend or agent (stripped before critics see the text)
    pub source: String,
    /// Answer text
    pub content: String,
    /// Self-reported confidence, 0..1
    pub confidence: f64,
    /// Source URIs, if any
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

impl CouncilResponse {
    /// Create a response from a backend/agent answer
    #[must_use]
    pub fn new(source: impl Into<String>, content: impl Into<String>, confidence: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            content: content.into(),
            confidence,
            sources: Vec::new(),
        }
    }
}

/// One critic's score of one response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Critique {
    /// The scored response
    pub response_id: Uuid,
    /// The critic (never the response's own source)
    pub critic_id: String,
    /// Score, 1..=10
    pub score: u8,
    /// Short feedback
    pub feedback: String,
}

/// Aggregate consensus over all scored responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consensus {
    /// Mean of per-response mean critique scores. Responses with zero
    /// critiques are excluded, not scored as zero.
    pub average_score: f64,
}

/// Result of a full council run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilOutcome {
    /// All surviving responses
    pub responses: Vec<CouncilResponse>,
    /// All valid critiques
    pub critiques: Vec<Critique>,
    /// The synthesized final answer
    pub final_response: CouncilResponse,
    /// Aggregate consensus
    pub consensus: Consensus,
    /// Run metadata (best score, backends used, synthesis path)
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Mean critique score per response id, skipping responses with no critiques
#[must_use]
pub fn mean_scores(critiques: &[Critique]) -> HashMap<Uuid, f64> {
    let mut sums: HashMap<Uuid, (u32, u32)> = HashMap::new();
    for critique in critiques {
        let entry = sums.entry(critique.response_id).or_insert((0, 0));
        entry.0 += u32::from(critique.score);
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(id, (sum, count))| (id, f64::from(sum) / f64::from(count)))
        .collect()
}
