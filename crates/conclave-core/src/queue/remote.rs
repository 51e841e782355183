//! Remote push-queue publisher
//!
//! Publishes signed dispatch messages to an external push-queue service.
//! The service calls back into the HTTP layer with at-least-once delivery,
//! carrying the same payload plus the signature header produced here.
//! Verification accepts a set of keys so the signing key can rotate without
//! dropping in-flight messages.

use crate::error::{Error, Result};
use crate::task::{AgentSelection, Task, TaskInput};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Header carrying the payload signature on both legs
pub const SIGNATURE_HEADER: &str = "x-conclave-signature";

type HmacSha256 = Hmac<Sha256>;

/// Remote push-queue settings
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Push-queue publish endpoint
    pub endpoint: String,
    /// Current signing key
    pub signing_key: String,
    /// Publish request timeout
    pub timeout: Duration,
}

impl RemoteConfig {
    /// Create a config with the default publish timeout
    #[must_use]
    pub fn new(endpoint: impl Into<String>, signing_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            signing_key: signing_key.into(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// The payload published to the push queue and posted back on dispatch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchMessage {
    /// Task to execute
    pub task_id: Uuid,
    /// Agent(s) to run
    pub selection: AgentSelection,
    /// Client input
    pub input: TaskInput,
}

impl DispatchMessage {
    /// Build the dispatch payload for a task
    #[must_use]
    pub fn from_task(task: &Task) -> Self {
        Self {
            task_id: task.id,
            selection: task.selection.clone(),
            input: task.input.clone(),
        }
    }
}

/// Sign a payload with HMAC-SHA256, hex-encoded with a version prefix
pub fn sign_payload(key: &str, body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|_| Error::Configuration("invalid signing key".to_string()))?;
    mac.update(body);
    Ok(format!("v1={}", hex::encode(mac.finalize().into_bytes())))
}

/// Verify a payload signature against any of the given keys.
///
/// Callers pass the current and next key during rotation; a message signed
/// with either is accepted. Comparison is constant-time per key.
#[must_use]
pub fn verify_signature(keys: &[&str], body: &[u8], signature: &str) -> bool {
    keys.iter().any(|key| match sign_payload(key, body) {
        Ok(expected) => constant_time_eq(expected.as_bytes(), signature.as_bytes()),
        Err(_) => false,
    })
}

/// Constant-time comparison to prevent timing attacks
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[derive(Deserialize)]
struct PublishReply {
    #[serde(default)]
    dispatch_id: Option<String>,
}

/// Publishes signed dispatch messages to the remote push queue
pub struct RemotePublisher {
    config: RemoteConfig,
    client: reqwest::Client,
}

impl RemotePublisher {
    /// Create a publisher with its own HTTP client
    pub fn new(config: RemoteConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Dispatch(format!("failed to build http client: {e}")))?;
        Ok(Self { config, client })
    }

    /// Publish a task to the push queue, returning the dispatch id.
    ///
    /// Any failure here is non-fatal to enqueue; the caller falls back to
    /// the local worker pool.
    pub async fn publish(&self, task: &Task) -> Result<String> {
        let message = DispatchMessage::from_task(task);
        let body = serde_json::to_vec(&message)?;
        let signature = sign_payload(&self.config.signing_key, &body)?;

        let response = self
            .client
            .post(&self.config.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Dispatch(format!("push-queue publish failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Dispatch(format!(
                "push-queue publish returned {status}"
            )));
        }

        let dispatch_id = response
            .json::<PublishReply>()
            .await
            .ok()
            .and_then(|reply| reply.dispatch_id)
            .unwrap_or_else(|| format!("remote-{}", task.id));
        debug!(task_id = %task.id, dispatch_id = %dispatch_id, "task published to push queue");
        Ok(dispatch_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentKind;

    #[test]
    fn test_sign_verify_roundtrip() {
        let body = br#"{"task_id":"x"}"#;
        let signature = sign_payload("secret-key", body).unwrap();
        assert!(signature.starts_with("v1="));
        assert!(verify_signature(&["secret-key"], body, &signature));
    }

    #[test]
    fn test_rotated_key_still_verifies() {
        let body = b"payload";
        let signature = sign_payload("old-key", body).unwrap();
        assert!(verify_signature(&["new-key", "old-key"], body, &signature));
        assert!(!verify_signature(&["new-key"], body, &signature));
    }

    #[test]
    fn test_tampered_body_fails_verification() {
        let signature = sign_payload("secret-key", b"original").unwrap();
        assert!(!verify_signature(&["secret-key"], b"tampered", &signature));
    }

    #[test]
    fn test_truncated_signature_fails_verification() {
        let body = b"payload";
        let signature = sign_payload("secret-key", body).unwrap();
        assert!(!verify_signature(&["secret-key"], body, &signature[..10]));
    }

    #[test]
    fn test_dispatch_message_carries_task_identity() {
        let task = Task::new(
            AgentSelection::Single(AgentKind::Research),
            TaskInput {
                prompt: "p".to_string(),
                ..Default::default()
            },
        );
        let message = DispatchMessage::from_task(&task);
        assert_eq!(message.task_id, task.id);

        let json = serde_json::to_string(&message).unwrap();
        let back: DispatchMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.task_id, task.id);
    }
}
