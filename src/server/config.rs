//! Server configuration types and loading
//!
//! Every section has serde defaults, so an empty environment still yields a
//! runnable local configuration. Environment variables use the `CONCLAVE_`
//! prefix with `__` as the section separator, e.g. `CONCLAVE_SERVER__PORT`.

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub council: CouncilAppConfig,
    #[serde(default)]
    pub queue: QueueAppConfig,
    #[serde(default)]
    pub dlq: DlqAppConfig,
    #[serde(default)]
    pub stream: StreamAppConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Shared store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

/// Model backend settings. API keys come from the environment
/// (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`); only endpoints and model names
/// live here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(default = "default_anthropic_model")]
    pub anthropic_model: String,
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_anthropic_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            openai_base_url: default_openai_base_url(),
            openai_model: default_openai_model(),
            anthropic_model: default_anthropic_model(),
        }
    }
}

/// Council engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilAppConfig {
    #[serde(default = "default_min_models")]
    pub min_models: usize,
    #[serde(default = "default_max_models")]
    pub max_models: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Synthesize the final answer with an extra model call instead of
    /// returning the best response raw
    #[serde(default)]
    pub quality_synthesis: bool,
}

fn default_min_models() -> usize {
    2
}
fn default_max_models() -> usize {
    4
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2048
}

impl Default for CouncilAppConfig {
    fn default() -> Self {
        Self {
            min_models: default_min_models(),
            max_models: default_max_models(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            quality_synthesis: false,
        }
    }
}

/// Queue and remote-dispatch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueAppConfig {
    /// Remote push-queue endpoint; local-only dispatch when unset
    #[serde(default)]
    pub push_endpoint: Option<String>,
    /// Current callback signing key
    #[serde(default)]
    pub signing_key: Option<String>,
    /// Next signing key, accepted during rotation
    #[serde(default)]
    pub next_signing_key: Option<String>,
    /// Local pool concurrency
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_max_concurrent() -> usize {
    4
}

impl Default for QueueAppConfig {
    fn default() -> Self {
        Self {
            push_endpoint: None,
            signing_key: None,
            next_signing_key: None,
            max_concurrent: default_max_concurrent(),
        }
    }
}

/// Dead-letter sweep settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqAppConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_sweep_batch")]
    pub sweep_batch: usize,
}

fn default_max_retries() -> u32 {
    3
}
fn default_sweep_interval_secs() -> u64 {
    600
}
fn default_sweep_batch() -> usize {
    20
}

impl Default for DlqAppConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            sweep_interval_secs: default_sweep_interval_secs(),
            sweep_batch: default_sweep_batch(),
        }
    }
}

/// Live-stream settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamAppConfig {
    /// Buffer poll interval in milliseconds
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
    /// Keep-alive ping interval in seconds
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// Hard wall-clock ceiling per connection in seconds
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u64,
}

fn default_poll_ms() -> u64 {
    250
}
fn default_heartbeat_secs() -> u64 {
    15
}
fn default_max_duration_secs() -> u64 {
    600
}

impl Default for StreamAppConfig {
    fn default() -> Self {
        Self {
            poll_ms: default_poll_ms(),
            heartbeat_secs: default_heartbeat_secs(),
            max_duration_secs: default_max_duration_secs(),
        }
    }
}

/// Load configuration from optional files and the environment
pub fn load_config(config_file: Option<&str>) -> Result<AppConfig> {
    let mut builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            File::with_name(&format!(
                "config/{}",
                std::env::var("CONCLAVE_ENV").unwrap_or_else(|_| "development".to_string())
            ))
            .required(false),
        )
        .add_source(File::with_name("config/local").required(false));

    // An explicit file overrides the config/ convention but not the env
    if let Some(path) = config_file {
        builder = builder.add_source(File::with_name(path));
    }

    // prefix_separator("_") so CONCLAVE_SERVER__PORT matches the .env
    // convention (single underscore after the prefix)
    let config = builder
        .add_source(
            Environment::with_prefix("CONCLAVE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_runnable() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.council.min_models, 2);
        assert_eq!(config.dlq.sweep_interval_secs, 600);
        assert!(config.queue.push_endpoint.is_none());
    }

    #[test]
    fn test_empty_object_deserializes_with_defaults() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.stream.max_duration_secs, 600);
        assert_eq!(config.redis.url, "redis://127.0.0.1:6379");
    }
}
