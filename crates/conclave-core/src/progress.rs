//! Per-task progress event buffer
//!
//! Every progress-worthy occurrence is appended to a bounded, TTL'd list in
//! the shared store with a monotonically increasing sequence number. Live
//! connections replay the buffer from sequence 0 and then poll for new
//! entries; the buffer, not the connection, is authoritative.

use crate::error::Result;
use crate::store::KvStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Maximum buffered events per task; the oldest are evicted past this
pub const EVENT_BUFFER_CAP: usize = 500;

/// Event buffer retention — shorter than task status retention
pub const EVENT_TTL_SECS: u64 = 3600;

/// Progress event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventKind {
    /// Stream preamble
    Connected,
    /// Coarse progress update (phase start/finish, percent)
    Progress,
    /// Model reasoning step (council gather/critique activity)
    Thinking,
    /// Chunk of generated text
    Chunk,
    /// Terminal success
    Done,
    /// Terminal failure
    Error,
}

/// One entry in a task's progress buffer. Strictly ordered by `sequence`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Owning task
    pub task_id: Uuid,
    /// Monotonic per-task sequence, starting at 0
    pub sequence: u64,
    /// Event kind
    pub kind: ProgressEventKind,
    /// Free-form payload
    pub payload: Value,
    /// When the event was appended
    pub timestamp: DateTime<Utc>,
}

/// Append/replay interface over a task's event buffer
#[derive(Clone)]
pub struct ProgressChannel {
    kv: Arc<dyn KvStore>,
}

impl ProgressChannel {
    /// Create a channel over the given store
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn buffer_key(task_id: Uuid) -> String {
        format!("events:{task_id}")
    }

    fn seq_key(task_id: Uuid) -> String {
        format!("seq:{task_id}")
    }

    /// Append an event, assigning the next sequence number
    pub async fn append(
        &self,
        task_id: Uuid,
        kind: ProgressEventKind,
        payload: Value,
    ) -> Result<ProgressEvent> {
        // INCR yields 1 for the first event; sequences are zero-based
        let sequence = self.kv.incr(&Self::seq_key(task_id), EVENT_TTL_SECS).await? - 1;
        let event = ProgressEvent {
            task_id,
            sequence,
            kind,
            payload,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event)?;
        self.kv
            .push_back_capped(&Self::buffer_key(task_id), &json, EVENT_BUFFER_CAP, EVENT_TTL_SECS)
            .await?;
        debug!(task_id = %task_id, sequence, kind = ?kind, "progress event appended");
        Ok(event)
    }

    /// Convenience: append a free-text progress tag
    pub async fn note(&self, task_id: Uuid, tag: &str) -> Result<()> {
        self.append(
            task_id,
            ProgressEventKind::Progress,
            serde_json::json!({ "message": tag }),
        )
        .await?;
        Ok(())
    }

    /// Replay the full buffered history, oldest first
    pub async fn replay(&self, task_id: Uuid) -> Result<Vec<ProgressEvent>> {
        let raw = self.kv.range(&Self::buffer_key(task_id), 0, -1).await?;
        Ok(Self::decode(raw))
    }

    /// Events strictly after the given sequence number
    pub async fn events_after(&self, task_id: Uuid, sequence: u64) -> Result<Vec<ProgressEvent>> {
        // The buffer is bounded, so a full read stays cheap; filtering by
        // sequence also tolerates entries evicted from the front.
        let events = self.replay(task_id).await?;
        Ok(events
            .into_iter()
            .filter(|e| e.sequence > sequence)
            .collect())
    }

    fn decode(raw: Vec<String>) -> Vec<ProgressEvent> {
        raw.into_iter()
            .filter_map(|json| match serde_json::from_str(&json) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(error = %e, "dropping undecodable progress event");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn channel() -> ProgressChannel {
        ProgressChannel::new(Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn test_sequences_are_monotonic_from_zero() {
        let channel = channel();
        let task_id = Uuid::new_v4();

        for i in 0..4u64 {
            let event = channel
                .append(task_id, ProgressEventKind::Progress, serde_json::json!(i))
                .await
                .unwrap();
            assert_eq!(event.sequence, i);
        }
    }

    #[tokio::test]
    async fn test_replay_is_idempotent() {
        let channel = channel();
        let task_id = Uuid::new_v4();

        channel
            .append(task_id, ProgressEventKind::Connected, Value::Null)
            .await
            .unwrap();
        channel.note(task_id, "draft started").await.unwrap();
        channel
            .append(task_id, ProgressEventKind::Done, Value::Null)
            .await
            .unwrap();

        let first = channel.replay(task_id).await.unwrap();
        let second = channel.replay(task_id).await.unwrap();
        let seqs: Vec<u64> = first.iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert_eq!(
            seqs,
            second.iter().map(|e| e.sequence).collect::<Vec<u64>>()
        );
    }

    #[tokio::test]
    async fn test_events_after_filters_by_sequence() {
        let channel = channel();
        let task_id = Uuid::new_v4();

        for _ in 0..5 {
            channel.note(task_id, "tick").await.unwrap();
        }

        let tail = channel.events_after(task_id, 2).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].sequence, 3);
        assert_eq!(tail[1].sequence, 4);

        assert!(channel.events_after(task_id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_buffers_are_isolated_per_task() {
        let channel = channel();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        channel.note(a, "a").await.unwrap();
        channel.note(b, "b").await.unwrap();
        channel.note(b, "b2").await.unwrap();

        assert_eq!(channel.replay(a).await.unwrap().len(), 1);
        assert_eq!(channel.replay(b).await.unwrap().len(), 2);
    }
}
