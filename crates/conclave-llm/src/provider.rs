//! Model backend trait definition
//!
//! Every backend the council can poll implements this trait. The council
//! treats a backend as a black box: prompt in, text plus token counts and
//! timing out, bounded by the request's timeout.

use crate::completion::{CompletionRequest, CompletionResponse};
use crate::error::Result;

/// Trait for model backends
#[async_trait::async_trait]
pub trait ModelBackend: Send + Sync {
    /// Get the backend name (also its registry key)
    fn name(&self) -> &str;

    /// Get the default model
    fn default_model(&self) -> &str;

    /// Run one completion
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;
}
