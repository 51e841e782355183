//! In-memory store for tests and single-process deployments
//!
//! Honors the same TTL and capped-list semantics as the Redis store, with
//! expiry checked lazily on access.

use super::KvStore;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry {
    value: String,
    expires_at: Instant,
}

struct ListEntry {
    items: VecDeque<String>,
    expires_at: Instant,
}

/// In-memory implementation of [`KvStore`]
#[derive(Default)]
pub struct InMemoryStore {
    values: Mutex<HashMap<String, Entry>>,
    lists: Mutex<HashMap<String, ListEntry>>,
}

impl InMemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn expired(expires_at: Instant) -> bool {
    Instant::now() >= expires_at
}

fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let normalize = |i: isize| -> isize {
        if i < 0 {
            i + len as isize
        } else {
            i
        }
    };
    let start = normalize(start).max(0) as usize;
    let stop = normalize(stop);
    if stop < 0 || start >= len {
        return None;
    }
    let stop = (stop as usize).min(len - 1);
    if start > stop {
        return None;
    }
    Some((start, stop))
}

#[async_trait]
impl KvStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        match values.get(key) {
            Some(entry) if !expired(entry.expires_at) => Ok(Some(entry.value.clone())),
            Some(_) => {
                values.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + Duration::from_secs(ttl_secs),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values.remove(key).is_some())
    }

    async fn incr(&self, key: &str, ttl_secs: u64) -> Result<u64> {
        // Counters share the string keyspace, as INCR and GET do in Redis
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        let current = values
            .get(key)
            .filter(|e| !expired(e.expires_at))
            .and_then(|e| e.value.parse::<u64>().ok())
            .unwrap_or(0);
        let next = current + 1;
        values.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at: Instant::now() + Duration::from_secs(ttl_secs),
            },
        );
        Ok(next)
    }

    async fn push_back_capped(
        &self,
        key: &str,
        value: &str,
        cap: usize,
        ttl_secs: u64,
    ) -> Result<()> {
        let mut lists = self.lists.lock().unwrap_or_else(|e| e.into_inner());
        let expires_at = Instant::now() + Duration::from_secs(ttl_secs);
        let entry = lists.entry(key.to_string()).or_insert(ListEntry {
            items: VecDeque::new(),
            expires_at,
        });
        if expired(entry.expires_at) {
            entry.items.clear();
        }
        entry.items.push_back(value.to_string());
        while entry.items.len() > cap {
            entry.items.pop_front();
        }
        entry.expires_at = expires_at;
        Ok(())
    }

    async fn pop_front(&self, key: &str) -> Result<Option<String>> {
        let mut lists = self.lists.lock().unwrap_or_else(|e| e.into_inner());
        match lists.get_mut(key) {
            Some(entry) if !expired(entry.expires_at) => Ok(entry.items.pop_front()),
            Some(_) => {
                lists.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let lists = self.lists.lock().unwrap_or_else(|e| e.into_inner());
        let Some(entry) = lists.get(key).filter(|e| !expired(e.expires_at)) else {
            return Ok(Vec::new());
        };
        let Some((start, stop)) = resolve_range(entry.items.len(), start, stop) else {
            return Ok(Vec::new());
        };
        Ok(entry
            .items
            .iter()
            .skip(start)
            .take(stop - start + 1)
            .cloned()
            .collect())
    }

    async fn list_len(&self, key: &str) -> Result<usize> {
        let lists = self.lists.lock().unwrap_or_else(|e| e.into_inner());
        Ok(lists
            .get(key)
            .filter(|e| !expired(e.expires_at))
            .map_or(0, |e| e.items.len()))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_set_delete() {
        let store = InMemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);
        store.set_ex("k", "v", 60).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_fifo_and_cap() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            store
                .push_back_capped("l", &i.to_string(), 3, 60)
                .await
                .unwrap();
        }
        // Cap 3 keeps the newest three; the oldest were evicted
        assert_eq!(store.list_len("l").await.unwrap(), 3);
        assert_eq!(store.pop_front("l").await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.pop_front("l").await.unwrap().as_deref(), Some("3"));
        assert_eq!(store.pop_front("l").await.unwrap().as_deref(), Some("4"));
        assert_eq!(store.pop_front("l").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_range_negative_indices() {
        let store = InMemoryStore::new();
        for s in ["a", "b", "c", "d"] {
            store.push_back_capped("l", s, 10, 60).await.unwrap();
        }
        assert_eq!(store.range("l", 0, -1).await.unwrap(), ["a", "b", "c", "d"]);
        assert_eq!(store.range("l", 1, 2).await.unwrap(), ["b", "c"]);
        assert_eq!(store.range("l", -2, -1).await.unwrap(), ["c", "d"]);
        assert!(store.range("l", 4, 9).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_incr_monotonic() {
        let store = InMemoryStore::new();
        assert_eq!(store.incr("seq", 60).await.unwrap(), 1);
        assert_eq!(store.incr("seq", 60).await.unwrap(), 2);
        assert_eq!(store.incr("seq", 60).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_incr_and_get_share_one_key() {
        let store = InMemoryStore::new();
        store.incr("hits", 60).await.unwrap();
        store.incr("hits", 60).await.unwrap();
        // A counter reads back through get, same as INCR then GET in Redis
        assert_eq!(store.get("hits").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let store = InMemoryStore::new();
        store.set_ex("k", "v", 0).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
