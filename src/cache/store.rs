//! Cache store collaborator interface and the in-memory reference
//! implementation.
//!
//! Payloads are opaque bytes; the store tracks nothing but the TTL. The
//! memory store expires lazily: an entry past its deadline is treated as
//! absent and dropped on the next touch.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::time::Instant;

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

#[derive(Debug, Error)]
pub enum CacheStoreError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
}

/// Capability interface over the backing key-value cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheStoreError>;
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheStoreError>;
    /// Remaining TTL for a live entry, `None` for an absent one.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheStoreError>;
    /// Keys matching a `prefix:*` pattern (or an exact key).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheStoreError>;
}

struct Entry {
    payload: Bytes,
    deadline: Instant,
}

/// In-memory TTL store.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn live(entry: &Entry) -> bool {
        entry.deadline > Instant::now()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheStoreError> {
        {
            let entries = rw_read(&self.entries, SOURCE, "get");
            match entries.get(key) {
                Some(entry) if Self::live(entry) => return Ok(Some(entry.payload.clone())),
                None => return Ok(None),
                Some(_) => {}
            }
        }
        // Expired: drop it on the way out.
        rw_write(&self.entries, SOURCE, "get.expire").remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheStoreError> {
        let entry = Entry {
            payload: value,
            deadline: Instant::now() + ttl,
        };
        rw_write(&self.entries, SOURCE, "set").insert(key.to_string(), entry);
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheStoreError> {
        let entries = rw_read(&self.entries, SOURCE, "ttl");
        Ok(entries.get(key).and_then(|entry| {
            let now = Instant::now();
            (entry.deadline > now).then(|| entry.deadline - now)
        }))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheStoreError> {
        let entries = rw_read(&self.entries, SOURCE, "keys");
        let matcher = |key: &str| match pattern.strip_suffix('*') {
            Some(prefix) => key.starts_with(prefix),
            None => key == pattern,
        };
        Ok(entries
            .iter()
            .filter(|(key, entry)| matcher(key) && Self::live(entry))
            .map(|(key, _)| key.clone())
            .collect())
    }
}
