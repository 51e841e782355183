//! Completion request and response types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Token usage information
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens
    pub prompt_tokens: u32,
    /// Completion tokens
    pub completion_tokens: u32,
    /// Total tokens
    pub total_tokens: u32,
}

/// A single completion request against one model backend
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model to use (backend-specific)
    pub model: String,
    /// System prompt
    pub system: Option<String>,
    /// User prompt
    pub prompt: String,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Temperature (0.0 - 2.0)
    pub temperature: Option<f32>,
    /// Per-call timeout; a timed-out call counts as a fan-in failure
    pub timeout: Duration,
}

impl Default for CompletionRequest {
    fn default() -> Self {
        Self {
            model: String::new(),
            system: None,
            prompt: String::new(),
            max_tokens: None,
            temperature: None,
            timeout: Duration::from_secs(60),
        }
    }
}

impl CompletionRequest {
    /// Create a new completion request
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    /// Set the model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the system prompt
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the per-call timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated content
    pub content: String,
    /// Token usage
    pub usage: Option<TokenUsage>,
    /// Model that produced the content
    pub model: String,
    /// Wall-clock latency in milliseconds
    pub latency_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let req = CompletionRequest::new("summarize this")
            .with_model("gpt-4o-mini")
            .with_system("You are terse.")
            .with_max_tokens(512)
            .with_temperature(0.4)
            .with_timeout(Duration::from_secs(30));

        assert_eq!(req.model, "gpt-4o-mini");
        assert_eq!(req.system.as_deref(), Some("You are terse."));
        assert_eq!(req.max_tokens, Some(512));
        assert_eq!(req.timeout, Duration::from_secs(30));
    }
}
