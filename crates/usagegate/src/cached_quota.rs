//! Read path for primed counters.

use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::{Cache, CacheError};
use crate::error::{QuotaError, QuotaResult};
use crate::provider::{QuotaKeyProvider, QuotaProvider};
use crate::types::QuotaRequest;

/// Reads the current counter for a quota straight from the cache.
///
/// This is the read path for out-of-band sync loops that reconcile cache
/// counters back to the authoritative store. An absent counter surfaces as
/// [`QuotaError::QuotaNotFound`] annotated with the resolved key.
pub struct CachedQuota {
    cache: Arc<dyn Cache>,
    quota_key: Arc<dyn QuotaKeyProvider>,
}

impl CachedQuota {
    pub fn new(cache: Arc<dyn Cache>, quota_key: Arc<dyn QuotaKeyProvider>) -> Self {
        Self { cache, quota_key }
    }
}

#[async_trait]
impl QuotaProvider for CachedQuota {
    async fn quota(&self, req: &QuotaRequest) -> QuotaResult<i64> {
        let key = self.quota_key.quota_key(req).await?;

        let value = match self.cache.get(&key).await {
            Ok(value) => value,
            Err(CacheError::NotFound) => return Err(QuotaError::QuotaNotFound { key }),
            Err(err) => return Err(QuotaError::Cache(err)),
        };

        value
            .parse()
            .map_err(|_| QuotaError::MalformedCounter { key, value })
    }
}
