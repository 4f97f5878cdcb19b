//! In-memory cache backend for local runs and tests.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::{Cache, CacheError};

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// A process-local [`Cache`] with the same observable semantics as the
/// Redis backend: counters initialize to zero, TTLs survive increments,
/// and expired entries read as absent.
///
/// Expiry is lazy: entries are evicted when touched past their deadline.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

fn evict_expired(entries: &mut HashMap<String, Entry>, key: &str) {
    if entries.get(key).is_some_and(Entry::is_expired) {
        entries.remove(key);
    }
}

fn deadline(expiration: Duration) -> Option<Instant> {
    if expiration.is_zero() {
        None
    } else {
        Some(Instant::now() + expiration)
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn add(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        let mut entries = self.entries.write().await;
        evict_expired(&mut entries, key);

        let (value, expires_at) = match entries.get(key) {
            Some(entry) => {
                let current: i64 = entry.value.parse().map_err(|_| {
                    CacheError::Backend(format!("value at {key} is not an integer"))
                })?;
                (current + delta, entry.expires_at)
            }
            None => (delta, None),
        };

        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );

        Ok(value)
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn incr_by(&self, key: &str, value: i64) -> Result<i64, CacheError> {
        self.add(key, value).await
    }

    async fn decr_by(&self, key: &str, decrement: i64) -> Result<i64, CacheError> {
        self.add(key, -decrement).await
    }

    async fn set(&self, key: &str, value: &str, expiration: Duration) -> Result<String, CacheError> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: deadline(expiration),
            },
        );
        Ok("OK".to_string())
    }

    async fn get(&self, key: &str) -> Result<String, CacheError> {
        let mut entries = self.entries.write().await;
        evict_expired(&mut entries, key);
        entries
            .get(key)
            .map(|entry| entry.value.clone())
            .ok_or(CacheError::NotFound)
    }

    async fn set_nx(
        &self,
        key: &str,
        value: &str,
        expiration: Duration,
    ) -> Result<bool, CacheError> {
        let mut entries = self.entries.write().await;
        evict_expired(&mut entries, key);

        if entries.contains_key(key) {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: deadline(expiration),
            },
        );
        Ok(true)
    }

    async fn exists(&self, keys: &[&str]) -> Result<i64, CacheError> {
        let mut entries = self.entries.write().await;
        let mut count = 0;
        for key in keys {
            evict_expired(&mut entries, key);
            if entries.contains_key(*key) {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn del(&self, keys: &[&str]) -> Result<i64, CacheError> {
        let mut entries = self.entries.write().await;
        let mut removed = 0;
        for key in keys {
            if let Some(entry) = entries.remove(*key) {
                if !entry.is_expired() {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}
