//! Model backend resolution
//!
//! Registers every backend whose API key is present in the environment.
//! Council consensus needs at least two distinct backends; a single backend
//! still serves single-agent pipelines, so registration is not an error
//! until the registry is empty.

use super::config::LlmConfig;
use anyhow::{bail, Result};
use conclave_llm::{
    AnthropicBackend, AnthropicConfig, BackendRegistry, OpenAiBackend, OpenAiConfig,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Build the backend registry from environment keys and config
pub fn resolve_backends(llm_config: &LlmConfig) -> Result<Arc<BackendRegistry>> {
    let mut registry = BackendRegistry::new();

    if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
        let config = OpenAiConfig::new(api_key)
            .with_base_url(&llm_config.openai_base_url)
            .with_model(&llm_config.openai_model);
        match OpenAiBackend::new(config) {
            Ok(backend) => {
                registry.register(Arc::new(backend));
                info!(model = %llm_config.openai_model, "registered OpenAI backend");
            }
            Err(e) => warn!(error = %e, "failed to create OpenAI backend"),
        }
    }

    if let Ok(api_key) = std::env::var("ANTHROPIC_API_KEY") {
        let config = AnthropicConfig::new(api_key).with_model(&llm_config.anthropic_model);
        match AnthropicBackend::new(config) {
            Ok(backend) => {
                registry.register(Arc::new(backend));
                info!(model = %llm_config.anthropic_model, "registered Anthropic backend");
            }
            Err(e) => warn!(error = %e, "failed to create Anthropic backend"),
        }
    }

    if registry.is_empty() {
        bail!(
            "no model backends configured; set OPENAI_API_KEY and/or ANTHROPIC_API_KEY"
        );
    }
    if registry.len() < 2 {
        warn!("only one model backend configured; council consensus requires at least two");
    }

    info!(backends = registry.len(), "model registry initialized");
    Ok(Arc::new(registry))
}
