//! Redis-backed shared store (for production)
//!
//! # Security
//!
//! - TTL-based expiration on every key
//! - Keys are prefixed to isolate Conclave data from other Redis users
//! - Enable Redis AUTH and TLS in production

use super::KvStore;
use crate::error::{Error, Result};
use async_trait::async_trait;

/// Redis implementation of [`KvStore`]
pub struct RedisStore {
    client: redis::Client,
    /// Key prefix applied to every key
    prefix: String,
}

impl RedisStore {
    /// Create a new Redis store
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis URL is invalid.
    pub fn new(redis_url: &str) -> Result<Self> {
        let client =
            redis::Client::open(redis_url).map_err(|e| Error::Store(e.to_string()))?;
        Ok(Self {
            client,
            prefix: "conclave:".to_string(),
        })
    }

    /// Create with a custom key prefix
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis URL is invalid.
    pub fn with_prefix(redis_url: &str, prefix: &str) -> Result<Self> {
        let client =
            redis::Client::open(redis_url).map_err(|e| Error::Store(e.to_string()))?;
        Ok(Self {
            client,
            prefix: prefix.to_string(),
        })
    }

    fn build_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| Error::Store(format!("Redis connection failed: {e}")))
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.get_connection().await?;
        redis::cmd("GET")
            .arg(self.build_key(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Store(format!("Redis GET failed: {e}")))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.get_connection().await?;
        redis::cmd("SETEX")
            .arg(self.build_key(key))
            .arg(ttl_secs)
            .arg(value)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| Error::Store(format!("Redis SETEX failed: {e}")))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let deleted: i64 = redis::cmd("DEL")
            .arg(self.build_key(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Store(format!("Redis DEL failed: {e}")))?;
        Ok(deleted > 0)
    }

    async fn incr(&self, key: &str, ttl_secs: u64) -> Result<u64> {
        let mut conn = self.get_connection().await?;
        let key = self.build_key(key);
        let value: u64 = redis::cmd("INCR")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Store(format!("Redis INCR failed: {e}")))?;
        redis::cmd("EXPIRE")
            .arg(&key)
            .arg(ttl_secs)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| Error::Store(format!("Redis EXPIRE failed: {e}")))?;
        Ok(value)
    }

    async fn push_back_capped(
        &self,
        key: &str,
        value: &str,
        cap: usize,
        ttl_secs: u64,
    ) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let key = self.build_key(key);
        // RPUSH + LTRIM keeps the newest `cap` entries, evicting the oldest
        redis::pipe()
            .cmd("RPUSH")
            .arg(&key)
            .arg(value)
            .ignore()
            .cmd("LTRIM")
            .arg(&key)
            .arg(-(cap as i64))
            .arg(-1)
            .ignore()
            .cmd("EXPIRE")
            .arg(&key)
            .arg(ttl_secs)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| Error::Store(format!("Redis RPUSH/LTRIM failed: {e}")))
    }

    async fn pop_front(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.get_connection().await?;
        redis::cmd("LPOP")
            .arg(self.build_key(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Store(format!("Redis LPOP failed: {e}")))
    }

    async fn range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let mut conn = self.get_connection().await?;
        redis::cmd("LRANGE")
            .arg(self.build_key(key))
            .arg(start as i64)
            .arg(stop as i64)
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Store(format!("Redis LRANGE failed: {e}")))
    }

    async fn list_len(&self, key: &str) -> Result<usize> {
        let mut conn = self.get_connection().await?;
        let len: i64 = redis::cmd("LLEN")
            .arg(self.build_key(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Store(format!("Redis LLEN failed: {e}")))?;
        Ok(len.max(0) as usize)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.get_connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| Error::Store(format!("Redis PING failed: {e}")))?;
        Ok(())
    }
}
