//! Lazy first-touch priming of quota counters.
//!
//! On first touch the counter key does not exist yet; an increment would
//! initialize it to the charged amount instead of `baseline + amount`. The
//! primer guarantees that for any request, either the counter already
//! exists, or this call writes the authoritative baseline under a
//! cache-level lease before returning.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::cache::Cache;
use crate::error::{QuotaError, QuotaErrorKind, QuotaResult};
use crate::provider::{QuotaExpirationProvider, QuotaKeyProvider, QuotaProvider};
use crate::types::QuotaRequest;

/// Suffix appended to a counter key to form its lease key. Part of the
/// observable contract: operators can infer the lock namespace from the
/// counter namespace.
const LOCK_SUFFIX: &str = "-lock";

/// The lease key guarding the priming of `counter_key`.
pub fn lock_key(counter_key: &str) -> String {
    format!("{counter_key}{LOCK_SUFFIX}")
}

/// Tuning for the primer and its retry wrapper. Zero fields fall back to
/// the documented defaults at read time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrimerConfig {
    /// TTL of the priming lease. Defaults to 1 second.
    pub lock_in: Duration,
    /// Total priming attempts. Defaults to 1.
    pub max_retry: u32,
    /// Pause between attempts. Defaults to 50 milliseconds.
    pub retry_in: Duration,
}

impl PrimerConfig {
    pub fn lock_in(&self) -> Duration {
        if self.lock_in.is_zero() {
            Duration::from_secs(1)
        } else {
            self.lock_in
        }
    }

    pub fn max_retry(&self) -> u32 {
        if self.max_retry == 0 {
            1
        } else {
            self.max_retry
        }
    }

    pub fn retry_in(&self) -> Duration {
        if self.retry_in.is_zero() {
            Duration::from_millis(50)
        } else {
            self.retry_in
        }
    }
}

/// Ensures a quota's counter exists in the cache, writing the
/// authoritative baseline if it does not.
#[async_trait]
pub trait PrimeQuota: Send + Sync {
    async fn prime(&self, req: &QuotaRequest) -> QuotaResult<()>;
}

/// Lease-based primer.
///
/// Priming is idempotent: replaying it on an already-primed key is a
/// no-op. Concurrent primers on the same key either observe the primed
/// counter or back off with [`QuotaError::LockedKey`]; a crashed holder's
/// lease self-heals after `lock_in`.
pub struct SetNxQuotaPrimer {
    cache: Arc<dyn Cache>,
    quota_key: Arc<dyn QuotaKeyProvider>,
    quota_expiration: Arc<dyn QuotaExpirationProvider>,
    quota_usage: Arc<dyn QuotaProvider>,
    lock_in: Duration,
}

impl SetNxQuotaPrimer {
    pub fn new(
        cache: Arc<dyn Cache>,
        quota_key: Arc<dyn QuotaKeyProvider>,
        quota_expiration: Arc<dyn QuotaExpirationProvider>,
        quota_usage: Arc<dyn QuotaProvider>,
        lock_in: Duration,
    ) -> Self {
        Self {
            cache,
            quota_key,
            quota_expiration,
            quota_usage,
            lock_in,
        }
    }

    async fn write_baseline(&self, req: &QuotaRequest, key: &str) -> QuotaResult<()> {
        let baseline = self.quota_usage.quota(req).await?;
        let ttl = self.quota_expiration.expiration(req).await?;

        // Write-if-absent: a racing primer in another region, or a manual
        // write, wins over us.
        self.cache.set_nx(key, &baseline.to_string(), ttl).await?;
        debug!(key, baseline, "primed quota counter");
        Ok(())
    }
}

#[async_trait]
impl PrimeQuota for SetNxQuotaPrimer {
    async fn prime(&self, req: &QuotaRequest) -> QuotaResult<()> {
        let key = match self.quota_key.quota_key(req).await {
            Ok(key) => key,
            // No quota applies; the downstream pipeline stage makes the
            // same call and delegates on its own.
            Err(err) if err.is(QuotaErrorKind::QuotaNotFound) => return Ok(()),
            Err(err) => return Err(err),
        };

        if self.cache.exists(&[&key]).await? >= 1 {
            return Ok(());
        }

        let lock = lock_key(&key);
        if !self.cache.set_nx(&lock, "1", self.lock_in).await? {
            return Err(QuotaError::LockedKey { key: lock });
        }

        let outcome = self.write_baseline(req, &key).await;

        // The lease comes off on every exit path. An undeleted lock blocks
        // all priming of this key until its TTL fires, so an unlock error
        // supersedes whatever happened above.
        match self.cache.del(&[&lock]).await {
            Ok(_) => outcome,
            Err(err) => {
                warn!(key = %lock, error = %err, "failed to release priming lease");
                Err(QuotaError::Cache(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryCache;
    use crate::cache::CacheError;
    use crate::testutil::{KeyOf, QuotaOf, TtlOf};

    fn primer_over(
        cache: Arc<dyn Cache>,
        key: QuotaResult<&'static str>,
        usage: QuotaResult<i64>,
        ttl: Duration,
    ) -> SetNxQuotaPrimer {
        SetNxQuotaPrimer::new(
            cache,
            Arc::new(KeyOf(key)),
            Arc::new(TtlOf(ttl)),
            Arc::new(QuotaOf(usage)),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn test_primes_absent_counter_and_releases_lease() {
        let cache = Arc::new(MemoryCache::new());
        let primer = primer_over(
            cache.clone(),
            Ok("quota-1"),
            Ok(7000),
            Duration::from_secs(300),
        );

        primer.prime(&QuotaRequest::new("1")).await.unwrap();

        assert_eq!(cache.get("quota-1").await.unwrap(), "7000");
        assert_eq!(cache.exists(&["quota-1-lock"]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_prime_is_idempotent() {
        let cache = Arc::new(MemoryCache::new());
        cache.set("quota-1", "7000", Duration::ZERO).await.unwrap();

        // A second prime must not overwrite the counter even when the
        // baseline has moved on.
        let primer = primer_over(cache.clone(), Ok("quota-1"), Ok(9999), Duration::ZERO);

        primer.prime(&QuotaRequest::new("1")).await.unwrap();

        assert_eq!(cache.get("quota-1").await.unwrap(), "7000");
    }

    #[tokio::test]
    async fn test_held_lease_backs_off_with_locked_key() {
        let cache = Arc::new(MemoryCache::new());
        cache
            .set("quota-1-lock", "1", Duration::from_secs(1))
            .await
            .unwrap();

        let primer = primer_over(cache.clone(), Ok("quota-1"), Ok(7000), Duration::ZERO);

        let err = primer.prime(&QuotaRequest::new("1")).await.unwrap_err();

        assert!(err.is(QuotaErrorKind::LockedKey));
        assert_eq!(err.to_string(), "locked key quota-1-lock");
        // Counter untouched while someone else holds the lease.
        assert_eq!(cache.exists(&["quota-1"]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_quota_not_found_from_key_provider_is_success() {
        let cache = Arc::new(MemoryCache::new());
        let primer = primer_over(
            cache.clone(),
            Err(QuotaError::QuotaNotFound {
                key: "1".to_string(),
            }),
            Ok(7000),
            Duration::ZERO,
        );

        primer.prime(&QuotaRequest::new("1")).await.unwrap();
        assert_eq!(cache.exists(&["quota-1"]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_key_provider_error_is_surfaced() {
        let cache = Arc::new(MemoryCache::new());
        let primer = primer_over(
            cache,
            Err(QuotaError::Other(anyhow::anyhow!("unexpected"))),
            Ok(7000),
            Duration::ZERO,
        );

        let err = primer.prime(&QuotaRequest::new("1")).await.unwrap_err();
        assert_eq!(err.to_string(), "unexpected");
    }

    #[tokio::test]
    async fn test_baseline_error_still_releases_lease() {
        let cache = Arc::new(MemoryCache::new());
        let primer = primer_over(
            cache.clone(),
            Ok("quota-1"),
            Err(QuotaError::Other(anyhow::anyhow!("baseline unavailable"))),
            Duration::ZERO,
        );

        let err = primer.prime(&QuotaRequest::new("1")).await.unwrap_err();

        assert_eq!(err.to_string(), "baseline unavailable");
        assert_eq!(cache.exists(&["quota-1-lock"]).await.unwrap(), 0);
    }

    /// Delegates to a [`MemoryCache`] but fails every `del`.
    struct StuckLease {
        inner: MemoryCache,
    }

    #[async_trait]
    impl Cache for StuckLease {
        async fn incr_by(&self, key: &str, value: i64) -> Result<i64, CacheError> {
            self.inner.incr_by(key, value).await
        }
        async fn decr_by(&self, key: &str, decrement: i64) -> Result<i64, CacheError> {
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
        async fn del(&self, _keys: &[&str]) -> Result<i64, CacheError> {
            Err(CacheError::Backend("del refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_unlock_error_supersedes_baseline_error() {
        let cache = Arc::new(StuckLease {
            inner: MemoryCache::new(),
        });
        let primer = primer_over(
            cache,
            Ok("quota-1"),
            Err(QuotaError::Other(anyhow::anyhow!("baseline unavailable"))),
            Duration::ZERO,
        );

        let err = primer.prime(&QuotaRequest::new("1")).await.unwrap_err();

        assert!(err.is(QuotaErrorKind::Cache));
        assert_eq!(err.to_string(), "cache backend error: del refused");
    }

    #[tokio::test]
    async fn test_unlock_error_supersedes_success() {
        let cache = Arc::new(StuckLease {
            inner: MemoryCache::new(),
        });
        let primer = primer_over(cache, Ok("quota-1"), Ok(7000), Duration::ZERO);

        let err = primer.prime(&QuotaRequest::new("1")).await.unwrap_err();
        assert!(err.is(QuotaErrorKind::Cache));
    }

    #[test]
    fn test_lock_key_format() {
        assert_eq!(
            lock_key("voucher-quota-usage-1"),
            "voucher-quota-usage-1-lock"
        );
    }

    #[test]
    fn test_config_defaults_apply_to_zero_fields() {
        let config = PrimerConfig::default();

        assert_eq!(config.lock_in(), Duration::from_secs(1));
        assert_eq!(config.max_retry(), 1);
        assert_eq!(config.retry_in(), Duration::from_millis(50));
    }

    #[test]
    fn test_config_keeps_explicit_values() {
        let config = PrimerConfig {
            lock_in: Duration::from_secs(5),
            max_retry: 10,
            retry_in: Duration::from_millis(100),
        };

        assert_eq!(config.lock_in(), Duration::from_secs(5));
        assert_eq!(config.max_retry(), 10);
        assert_eq!(config.retry_in(), Duration::from_millis(100));
    }
}
