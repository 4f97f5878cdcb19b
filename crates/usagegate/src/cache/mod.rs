//! The atomic cache capability the engine runs against.
//!
//! The engine needs exactly seven operations over a string keyspace. Any
//! backend that provides them atomically can drive the engine; the crate
//! ships [`RedisCache`](redis::RedisCache) for production and
//! [`MemoryCache`](memory::MemoryCache) for local runs and tests.

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from a cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The requested key does not exist.
    #[error("cache not found")]
    NotFound,

    /// Transport or backend failure.
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Atomic operations over a shared key-value cache.
///
/// All operations are atomic at the backend. A zero `expiration` means
/// "no expiry".
#[async_trait]
pub trait Cache: Send + Sync {
    /// Atomically add `value` to the counter at `key`, initializing an
    /// absent key to zero first. Returns the post-increment total.
    async fn incr_by(&self, key: &str, value: i64) -> Result<i64, CacheError>;

    /// Atomically subtract `decrement` from the counter at `key`.
    /// Returns the post-decrement total.
    async fn decr_by(&self, key: &str, decrement: i64) -> Result<i64, CacheError>;

    /// Unconditionally write `value` under `key` with the given TTL.
    /// Returns the backend status string.
    async fn set(&self, key: &str, value: &str, expiration: Duration) -> Result<String, CacheError>;

    /// Read the value at `key`. Returns [`CacheError::NotFound`] when the
    /// key is absent.
    async fn get(&self, key: &str) -> Result<String, CacheError>;

    /// Write `value` under `key` only if the key is absent. Returns true
    /// iff this call created the key.
    async fn set_nx(&self, key: &str, value: &str, expiration: Duration)
        -> Result<bool, CacheError>;

    /// How many of the given keys exist.
    async fn exists(&self, keys: &[&str]) -> Result<i64, CacheError>;

    /// Remove the given keys. Returns how many were actually removed.
    async fn del(&self, keys: &[&str]) -> Result<i64, CacheError>;
}
