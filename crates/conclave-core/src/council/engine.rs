//! Council execution: gather, cross-critique, synthesize

use super::{mean_scores, Consensus, CouncilConfig, CouncilOutcome, CouncilResponse, Critique};
use crate::error::{Error, Result};
use crate::utils::{retry_with_backoff, RetryConfig};
use conclave_llm::{BackendRegistry, CompletionRequest, ModelBackend};
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Gather / cross-critique / synthesize over the registered backends
pub struct CouncilEngine {
    registry: Arc<BackendRegistry>,
    retry: RetryConfig,
}

impl CouncilEngine {
    /// Create an engine over the given backend registry
    #[must_use]
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self {
            registry,
            // One inline retry for transient-network failures; anything more
            // belongs to the dead-letter mechanism
            retry: RetryConfig::default().with_max_attempts(2),
        }
    }

    /// Run a full council pass: gather from `min..=max` backends, have the
    /// survivors critique each other, and synthesize one final answer.
    pub async fn run(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        config: &CouncilConfig,
    ) -> Result<CouncilOutcome> {
        let responses = self.gather(system_prompt, user_prompt, config).await?;
        self.cross_validate(responses, user_prompt, config).await
    }

    /// Cross-critique pre-gathered responses and synthesize. Also the entry
    /// point for multi-agent batches, whose responses come from agent
    /// pipelines rather than a gather round.
    pub async fn cross_validate(
        &self,
        responses: Vec<CouncilResponse>,
        context: &str,
        config: &CouncilConfig,
    ) -> Result<CouncilOutcome> {
        if responses.len() < config.min_models {
            return Err(Error::BelowThreshold {
                got: responses.len(),
                need: config.min_models,
            });
        }

        let critiques = self.critique_round(&responses, config).await;
        let scores = mean_scores(&critiques);

        let best = responses
            .iter()
            .filter(|r| scores.contains_key(&r.id))
            .max_by(|a, b| {
                scores[&a.id]
                    .partial_cmp(&scores[&b.id])
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            // No critique survived at all; fall back to the first response
            .unwrap_or(&responses[0])
            .clone();

        let best_score = scores.get(&best.id).copied().unwrap_or(0.0);
        let average_score = if scores.is_empty() {
            0.0
        } else {
            scores.values().sum::<f64>() / scores.len() as f64
        };

        let (final_response, synthesis_path) = if config.quality_synthesis {
            match self
                .blend(&responses, &scores, context, config)
                .await
            {
                Ok(blended) => (blended, "blend"),
                Err(e) => {
                    // The quality path is best-effort; the best raw response
                    // is always a valid answer
                    warn!(error = %e, "blend synthesis failed, returning best response");
                    (best.clone(), "best")
                }
            }
        } else {
            (best.clone(), "best")
        };

        let mut final_response = final_response;
        final_response.confidence = best_score / 10.0;

        let mut metadata = HashMap::new();
        metadata.insert("bestScore".to_string(), serde_json::json!(best_score));
        metadata.insert(
            "synthesis".to_string(),
            serde_json::json!(synthesis_path),
        );
        metadata.insert(
            "sourcesUsed".to_string(),
            serde_json::json!(responses.iter().map(|r| r.source.clone()).collect::<Vec<_>>()),
        );

        info!(
            responses = responses.len(),
            critiques = critiques.len(),
            best_score,
            average_score,
            "council pass finished"
        );

        Ok(CouncilOutcome {
            responses,
            critiques,
            final_response,
            consensus: Consensus { average_score },
            metadata,
        })
    }

    /// Poll up to `max_models` distinct backends in parallel, dropping
    /// failures, and require at least `min_models` survivors.
    async fn gather(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        config: &CouncilConfig,
    ) -> Result<Vec<CouncilResponse>> {
        let backends: Vec<_> = self
            .registry
            .all()
            .into_iter()
            .take(config.max_models)
            .collect();
        if backends.len() < config.min_models {
            return Err(Error::BelowThreshold {
                got: backends.len(),
                need: config.min_models,
            });
        }

        let calls = backends.iter().map(|backend| {
            let request = CompletionRequest::new(user_prompt)
                .with_system(system_prompt)
                .with_temperature(config.temperature)
                .with_max_tokens(config.max_tokens)
                .with_timeout(config.timeout);
            self.call_backend(backend.clone(), request)
        });

        let mut responses = Vec::new();
        for (backend, result) in backends.iter().zip(join_all(calls).await) {
            match result {
                Ok(content) => {
                    responses.push(CouncilResponse::new(backend.name(), content, 0.5));
                }
                Err(e) => {
                    // A failed or timed-out backend is dropped from the
                    // fan-in, not fatal to the run
                    warn!(backend = %backend.name(), error = %e, "backend dropped from gather");
                }
            }
        }

        if responses.len() < config.min_models {
            return Err(Error::BelowThreshold {
                got: responses.len(),
                need: config.min_models,
            });
        }
        debug!(survivors = responses.len(), "gather round complete");
        Ok(responses)
    }

    /// Every backend critiques every response it did not produce, in
    /// parallel. Individual critique failures are dropped without failing
    /// the batch.
    async fn critique_round(
        &self,
        responses: &[CouncilResponse],
        config: &CouncilConfig,
    ) -> Vec<Critique> {
        let critics: Vec<_> = self
            .registry
            .all()
            .into_iter()
            .take(config.max_models)
            .collect();

        let mut calls = Vec::new();
        for critic in &critics {
            for response in responses {
                // Never self-critique
                if response.source == critic.name() {
                    continue;
                }
                let request = CompletionRequest::new(critique_prompt(&response.content))
                    .with_system(CRITIC_SYSTEM_PROMPT)
                    .with_temperature(0.2)
                    .with_max_tokens(512)
                    .with_timeout(config.timeout);
                let critic = critic.clone();
                let response_id = response.id;
                calls.push(async move {
                    let content = self.call_backend(critic.clone(), request).await?;
                    parse_critique(&content)
                        .map(|(score, feedback)| Critique {
                            response_id,
                            critic_id: critic.name().to_string(),
                            score,
                            feedback,
                        })
                        .ok_or_else(|| {
                            Error::Internal("critique did not contain a valid score".to_string())
                        })
                });
            }
        }

        join_all(calls)
            .await
            .into_iter()
            .filter_map(|result| match result {
                Ok(critique) => Some(critique),
                Err(e) => {
                    debug!(error = %e, "critique dropped");
                    None
                }
            })
            .collect()
    }

    /// Quality synthesis: one extra call blending the top responses,
    /// weighted by their mean critique scores.
    async fn blend(
        &self,
        responses: &[CouncilResponse],
        scores: &HashMap<uuid::Uuid, f64>,
        context: &str,
        config: &CouncilConfig,
    ) -> Result<CouncilResponse> {
        let mut ranked: Vec<_> = responses
            .iter()
            .filter_map(|r| scores.get(&r.id).map(|s| (r, *s)))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(3);
        if ranked.is_empty() {
            return Err(Error::Internal("no scored responses to blend".to_string()));
        }

        let mut prompt = format!(
            "Task: {context}\n\nBlend the following answers into one, weighting by score:\n"
        );
        for (i, (response, score)) in ranked.iter().enumerate() {
            prompt.push_str(&format!(
                "\n[Answer {} — score {:.1}/10]\n{}\n",
                i + 1,
                score,
                response.content
            ));
        }

        let synthesizer = self
            .registry
            .all()
            .into_iter()
            .next()
            .ok_or_else(|| Error::Internal("no backend available for synthesis".to_string()))?;
        let request = CompletionRequest::new(prompt)
            .with_system("You merge several candidate answers into one coherent final answer. Prefer content from higher-scored answers.")
            .with_temperature(0.3)
            .with_max_tokens(config.max_tokens)
            .with_timeout(config.timeout);
        let content = self.call_backend(synthesizer.clone(), request).await?;
        Ok(CouncilResponse::new("synthesis", content, 0.0))
    }

    async fn call_backend(
        &self,
        backend: Arc<dyn ModelBackend>,
        request: CompletionRequest,
    ) -> Result<String> {
        let response = retry_with_backoff(
            &self.retry,
            || backend.complete(request.clone()),
            conclave_llm::Error::is_transient,
        )
        .await
        .map_err(|e| Error::Model(e.last_error))?;
        Ok(response.content)
    }
}

const CRITIC_SYSTEM_PROMPT: &str = "You are a strict reviewer. Score the \
    given answer from 1 (poor) to 10 (excellent) and give one short piece of \
    feedback. Reply with JSON only: {\"score\": <1-10>, \"feedback\": \"...\"}";

fn critique_prompt(content: &str) -> String {
    format!("Score this answer:\n\n{content}")
}

/// Extract score and feedback from a critique reply. Tolerates prose around
/// the JSON object; returns None when no usable score is present.
fn parse_critique(content: &str) -> Option<(u8, String)> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end <= start {
        return None;
    }
    let value: Value = serde_json::from_str(&content[start..=end]).ok()?;
    let score = value.get("score")?.as_f64()?;
    if !score.is_finite() {
        return None;
    }
    let score = score.round().clamp(1.0, 10.0) as u8;
    let feedback = value
        .get("feedback")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Some((score, feedback))
}
