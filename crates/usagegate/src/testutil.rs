//! Shared test doubles for the pipeline unit tests.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::cache::memory::MemoryCache;
use crate::cache::{Cache, CacheError};
use crate::error::{QuotaError, QuotaResult};
use crate::provider::{QuotaExpirationProvider, QuotaKeyProvider, QuotaProvider};
use crate::types::{QuotaRequest, QuotaUsageRequest};
use crate::update::{UpdateQuotaUsage, UpdateQuotaUsageListener};

/// Key provider with a fixed outcome.
pub struct KeyOf(pub QuotaResult<&'static str>);

#[async_trait]
impl QuotaKeyProvider for KeyOf {
    async fn quota_key(&self, _req: &QuotaRequest) -> QuotaResult<String> {
        match &self.0 {
            Ok(key) => Ok(key.to_string()),
            Err(QuotaError::QuotaNotFound { key }) => {
                Err(QuotaError::QuotaNotFound { key: key.clone() })
            }
            Err(err) => Err(QuotaError::Other(anyhow::anyhow!(err.to_string()))),
        }
    }
}

/// Quota provider (limit or baseline) with a fixed outcome.
pub struct QuotaOf(pub QuotaResult<i64>);

#[async_trait]
impl QuotaProvider for QuotaOf {
    async fn quota(&self, _req: &QuotaRequest) -> QuotaResult<i64> {
        match &self.0 {
            Ok(value) => Ok(*value),
            Err(err) => Err(QuotaError::Other(anyhow::anyhow!(err.to_string()))),
        }
    }
}

/// Expiration provider with a fixed TTL.
pub struct TtlOf(pub Duration);

#[async_trait]
impl QuotaExpirationProvider for TtlOf {
    async fn expiration(&self, _req: &QuotaRequest) -> QuotaResult<Duration> {
        Ok(self.0)
    }
}

/// `next` stage with a fixed outcome that records invocations.
pub struct StubNext {
    calls: AtomicUsize,
    seen_usage: AtomicI64,
    result: QuotaResult<Value>,
}

impl StubNext {
    pub fn ok(value: Value) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            seen_usage: AtomicI64::new(0),
            result: Ok(value),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            seen_usage: AtomicI64::new(0),
            result: Err(QuotaError::Other(anyhow::anyhow!(message.to_string()))),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The `usage` field of the last request this stage saw.
    pub fn seen_usage(&self) -> i64 {
        self.seen_usage.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpdateQuotaUsage for StubNext {
    async fn update(&self, req: &QuotaUsageRequest) -> QuotaResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_usage.store(req.usage, Ordering::SeqCst);
        match &self.result {
            Ok(value) => Ok(value.clone()),
            Err(err) => Err(QuotaError::Other(anyhow::anyhow!(err.to_string()))),
        }
    }
}

/// Listener that records every notification.
#[derive(Default)]
pub struct CollectingListener {
    successes: Mutex<Vec<i64>>,
    errors: Mutex<Vec<String>>,
}

impl CollectingListener {
    pub fn successes(&self) -> Vec<i64> {
        self.successes.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl UpdateQuotaUsageListener for CollectingListener {
    fn on_success(&self, _req: &QuotaUsageRequest, updated_usage: i64) {
        self.successes.lock().unwrap().push(updated_usage);
    }

    fn on_error(&self, _req: &QuotaUsageRequest, err: &QuotaError) {
        self.errors.lock().unwrap().push(err.to_string());
    }
}

/// Delegates to a [`MemoryCache`], optionally refusing increments or
/// decrements, for exercising compensation failure paths.
pub struct FlakyCache {
    pub inner: MemoryCache,
    fail_incr: bool,
    fail_decr: bool,
}

impl FlakyCache {
    pub fn new(fail_incr: bool, fail_decr: bool) -> Self {
        Self {
            inner: MemoryCache::new(),
            fail_incr,
            fail_decr,
        }
    }
}

#[async_trait]
impl Cache for FlakyCache {
    async fn incr_by(&self, key: &str, value: i64) -> Result<i64, CacheError> {
        if self.fail_incr {
            return Err(CacheError::Backend("incr refused".to_string()));
        }
        self.inner.incr_by(key, value).await
    }

    async fn decr_by(&self, key: &str, decrement: i64) -> Result<i64, CacheError> {
        if self.fail_decr {
            return Err(CacheError::Backend("decr refused".to_string()));
        }
        self.inner.decr_by(key, decrement).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<String, CacheError> {
        self.inner.set(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> Result<String, CacheError> {
        self.inner.get(key).await
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CacheError> {
        self.inner.set_nx(key, value, ttl).await
    }

    async fn exists(&self, keys: &[&str]) -> Result<i64, CacheError> {
        self.inner.exists(keys).await
    }

    async fn del(&self, keys: &[&str]) -> Result<i64, CacheError> {
        self.inner.del(keys).await
    }
}
