//! Test fixtures: a cache that records every operation, plus canned
//! providers, next actions, and a collecting listener.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use usagegate::{
    Cache, CacheError, MemoryCache, QuotaError, QuotaExpirationProvider, QuotaKeyProvider,
    QuotaProvider, QuotaRequest, QuotaResult, QuotaUsageRequest, UpdateQuotaUsage,
    UpdateQuotaUsageListener,
};

/// One observed cache operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOp {
    IncrBy { key: String, value: i64 },
    DecrBy { key: String, value: i64 },
    Set { key: String },
    Get { key: String },
    SetNx { key: String, value: String },
    Exists { keys: Vec<String> },
    Del { keys: Vec<String> },
}

/// A [`MemoryCache`] that records the operations issued against it, in
/// order. Seeding state for a scenario bypasses the log.
#[derive(Default)]
pub struct RecordingCache {
    inner: MemoryCache,
    ops: Mutex<Vec<CacheOp>>,
}

impl RecordingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a key without recording an operation.
    pub async fn seed(&self, key: &str, value: &str) {
        self.inner.set(key, value, Duration::ZERO).await.unwrap();
    }

    /// Pre-populate a key with a TTL without recording an operation.
    pub async fn seed_with_ttl(&self, key: &str, value: &str, ttl: Duration) {
        self.inner.set(key, value, ttl).await.unwrap();
    }

    /// Read a counter without recording an operation.
    pub async fn peek(&self, key: &str) -> Option<String> {
        self.inner.get(key).await.ok()
    }

    /// All operations issued so far, in order.
    pub fn ops(&self) -> Vec<CacheOp> {
        self.ops.lock().unwrap().clone()
    }

    fn record(&self, op: CacheOp) {
        self.ops.lock().unwrap().push(op);
    }
}

#[async_trait]
impl Cache for RecordingCache {
    async fn incr_by(&self, key: &str, value: i64) -> Result<i64, CacheError> {
        self.record(CacheOp::IncrBy {
            key: key.to_string(),
            value,
        });
        self.inner.incr_by(key, value).await
    }

    async fn decr_by(&self, key: &str, decrement: i64) -> Result<i64, CacheError> {
        self.record(CacheOp::DecrBy {
            key: key.to_string(),
            value: decrement,
        });
        self.inner.decr_by(key, decrement).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<String, CacheError> {
        self.record(CacheOp::Set {
            key: key.to_string(),
        });
        self.inner.set(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> Result<String, CacheError> {
        self.record(CacheOp::Get {
            key: key.to_string(),
        });
        self.inner.get(key).await
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CacheError> {
        self.record(CacheOp::SetNx {
            key: key.to_string(),
            value: value.to_string(),
        });
        self.inner.set_nx(key, value, ttl).await
    }

    async fn exists(&self, keys: &[&str]) -> Result<i64, CacheError> {
        self.record(CacheOp::Exists {
            keys: keys.iter().map(|k| k.to_string()).collect(),
        });
        self.inner.exists(keys).await
    }

    async fn del(&self, keys: &[&str]) -> Result<i64, CacheError> {
        self.record(CacheOp::Del {
            keys: keys.iter().map(|k| k.to_string()).collect(),
        });
        self.inner.del(keys).await
    }
}

/// Key provider mapping a quota ID to `quota-usage-<id>`.
pub struct UsageKey;

/// The counter key [`UsageKey`] resolves for a quota ID.
pub fn usage_key(quota_id: &str) -> String {
    format!("quota-usage-{quota_id}")
}

#[async_trait]
impl QuotaKeyProvider for UsageKey {
    async fn quota_key(&self, req: &QuotaRequest) -> QuotaResult<String> {
        Ok(usage_key(&req.quota_id))
    }
}

/// Key provider that reports "no quota applies" for every request.
pub struct NoQuotaKey;

#[async_trait]
impl QuotaKeyProvider for NoQuotaKey {
    async fn quota_key(&self, req: &QuotaRequest) -> QuotaResult<String> {
        Err(QuotaError::QuotaNotFound {
            key: req.quota_id.clone(),
        })
    }
}

/// Quota provider (limit or baseline) returning a fixed amount.
pub struct StaticQuota(pub i64);

#[async_trait]
impl QuotaProvider for StaticQuota {
    async fn quota(&self, _req: &QuotaRequest) -> QuotaResult<i64> {
        Ok(self.0)
    }
}

/// Quota provider that always fails, for exercising primer exit paths.
pub struct UnavailableQuota;

#[async_trait]
impl QuotaProvider for UnavailableQuota {
    async fn quota(&self, _req: &QuotaRequest) -> QuotaResult<i64> {
        Err(QuotaError::Other(anyhow::anyhow!("authoritative store down")))
    }
}

/// Expiration provider returning a fixed TTL.
pub struct StaticTtl(pub Duration);

#[async_trait]
impl QuotaExpirationProvider for StaticTtl {
    async fn expiration(&self, _req: &QuotaRequest) -> QuotaResult<Duration> {
        Ok(self.0)
    }
}

/// `next` action with a fixed outcome.
pub struct Next {
    result: Result<Value, String>,
}

impl Next {
    pub fn ok(value: Value) -> Arc<Self> {
        Arc::new(Self { result: Ok(value) })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Err(message.to_string()),
        })
    }
}

#[async_trait]
impl UpdateQuotaUsage for Next {
    async fn update(&self, _req: &QuotaUsageRequest) -> QuotaResult<Value> {
        match &self.result {
            Ok(value) => Ok(value.clone()),
            Err(message) => Err(QuotaError::Other(anyhow::anyhow!(message.clone()))),
        }
    }
}

/// Listener recording every notification.
#[derive(Default)]
pub struct CollectingListener {
    successes: Mutex<Vec<(String, i64)>>,
    errors: Mutex<Vec<String>>,
}

impl CollectingListener {
    pub fn successes(&self) -> Vec<(String, i64)> {
        self.successes.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl UpdateQuotaUsageListener for CollectingListener {
    fn on_success(&self, req: &QuotaUsageRequest, updated_usage: i64) {
        self.successes
            .lock()
            .unwrap()
            .push((req.quota_id.clone(), updated_usage));
    }

    fn on_error(&self, _req: &QuotaUsageRequest, err: &QuotaError) {
        self.errors.lock().unwrap().push(err.to_string());
    }
}
