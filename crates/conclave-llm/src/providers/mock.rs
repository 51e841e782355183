//! Mock model backend for testing
//!
//! Returns queued responses in order, or a default reply when the queue is
//! empty. Errors can be queued too, so fan-in and threshold logic can be
//! exercised without a network.

use crate::completion::{CompletionRequest, CompletionResponse};
use crate::error::{Error, Result};
use crate::provider::ModelBackend;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A mock backend with scripted replies
pub struct MockBackend {
    name: String,
    replies: Arc<Mutex<VecDeque<Result<String>>>>,
    calls: AtomicUsize,
}

impl MockBackend {
    /// Create a new mock backend
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            replies: Arc::new(Mutex::new(VecDeque::new())),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue a successful reply
    pub fn push_reply(&self, content: impl Into<String>) {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(content.into()));
    }

    /// Queue a failure
    pub fn push_error(&self, error: Error) {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(error));
    }

    /// Number of completions requested so far
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ModelBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        let content = match next {
            Some(Ok(content)) => content,
            Some(Err(e)) => return Err(e),
            None => format!("mock response from {}", self.name),
        };
        Ok(CompletionResponse {
            content,
            usage: None,
            model: "mock-model".to_string(),
            latency_ms: 0,
        })
    }
}
