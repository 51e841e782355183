//! Shared key-value store abstraction
//!
//! Task status, progress buffers and the dead-letter list all live in one
//! low-latency shared store. [`KvStore`] is the narrow surface the core
//! needs: get/set-with-TTL, capped list push, atomic pop and counters.
//! [`RedisStore`] is the production implementation; [`InMemoryStore`] backs
//! tests and single-process deployments.

mod memory;
mod redis_store;
mod tasks;

pub use memory::InMemoryStore;
pub use redis_store::RedisStore;
pub use tasks::TaskRepository;

use crate::error::Result;
use async_trait::async_trait;

/// Narrow key-value interface over the shared store
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get a value
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Set a value with a TTL in seconds
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    /// Delete a key; true if it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Atomically increment a counter, refreshing its TTL. Returns the new
    /// value (1 on first call).
    async fn incr(&self, key: &str, ttl_secs: u64) -> Result<u64>;

    /// Append to the back of a list, evicting from the front past `cap`,
    /// and refresh the list TTL
    async fn push_back_capped(&self, key: &str, value: &str, cap: usize, ttl_secs: u64)
        -> Result<()>;

    /// Atomically pop the front (oldest) element of a list
    async fn pop_front(&self, key: &str) -> Result<Option<String>>;

    /// Inclusive list range; negative indices count from the back
    async fn range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>>;

    /// List length (0 for missing keys)
    async fn list_len(&self, key: &str) -> Result<usize>;

    /// Connectivity check
    async fn ping(&self) -> Result<()>;
}
