//! Model backend abstraction for Conclave
//!
//! Defines the [`ModelBackend`] trait the council engine calls, the
//! completion request/response value types, concrete HTTP providers
//! (OpenAI-compatible and Anthropic), and a registry for resolving
//! backends by name.

pub mod completion;
pub mod error;
pub mod provider;
pub mod providers;
pub mod registry;

pub use completion::{CompletionRequest, CompletionResponse, TokenUsage};
pub use error::{Error, Result};
pub use provider::ModelBackend;
pub use providers::anthropic::{AnthropicBackend, AnthropicConfig};
pub use providers::mock::MockBackend;
pub use providers::openai::{OpenAiBackend, OpenAiConfig};
pub use registry::BackendRegistry;
