//! Provider seams the caller plugs into the engine.
//!
//! Each provider is a single-method capability resolving one fact about a
//! quota. Implementations typically read application state (a voucher row,
//! a plan table) carried opaquely in [`QuotaRequest::data`].

use std::time::Duration;

use async_trait::async_trait;

use crate::error::QuotaResult;
use crate::types::QuotaRequest;

/// Resolves the cache key for a quota's counter.
///
/// Returning [`QuotaError::QuotaNotFound`](crate::QuotaError::QuotaNotFound)
/// signals that no quota applies to the request: pipelines skip the charge
/// or refund entirely and delegate straight to their `next` action, and the
/// primer treats the request as already satisfied.
#[async_trait]
pub trait QuotaKeyProvider: Send + Sync {
    async fn quota_key(&self, req: &QuotaRequest) -> QuotaResult<String>;
}

/// Resolves a quota amount: the limit for charges, or the authoritative
/// usage baseline for priming.
#[async_trait]
pub trait QuotaProvider: Send + Sync {
    async fn quota(&self, req: &QuotaRequest) -> QuotaResult<i64>;
}

/// Resolves the TTL the counter key receives when it is first primed.
#[async_trait]
pub trait QuotaExpirationProvider: Send + Sync {
    async fn expiration(&self, req: &QuotaRequest) -> QuotaResult<Duration>;
}
