//! The composable pipeline element and its combinators.
//!
//! Every stage — charge, refund, primer adapter, chain, no-op, and the
//! caller's own `next` action — satisfies [`UpdateQuotaUsage`], so stages
//! compose by value at assembly time.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{QuotaError, QuotaResult};
use crate::primer::PrimeQuota;
use crate::types::QuotaUsageRequest;

/// A single stage of a quota update pipeline.
///
/// Returns an opaque result forwarded to the caller; stages with nothing
/// to report return [`Value::Null`]. Dropping the returned future cancels
/// the operation mid-flight; a counter mutation already issued is then not
/// compensated (at-least-once semantics — an out-of-band sync loop against
/// the authoritative store is the recovery mechanism).
#[async_trait]
pub trait UpdateQuotaUsage: Send + Sync {
    async fn update(&self, req: &QuotaUsageRequest) -> QuotaResult<Value>;
}

/// Observes engine outcomes of a charge or refund.
///
/// Listeners report the engine's own quota lifecycle, not the downstream
/// outcome: a failing `next` action is the caller's to handle on its
/// return path and is not reported here.
pub trait UpdateQuotaUsageListener: Send + Sync {
    /// The counter mutation committed; `updated_usage` is the post-value
    /// the cache returned.
    fn on_success(&self, req: &QuotaUsageRequest, updated_usage: i64);

    /// The operation failed with `err` before, or while undoing, the
    /// counter mutation.
    fn on_error(&self, req: &QuotaUsageRequest, err: &QuotaError);
}

/// Terminal stage that does nothing and reports no result.
pub struct NopUpdateQuotaUsage;

#[async_trait]
impl UpdateQuotaUsage for NopUpdateQuotaUsage {
    async fn update(&self, _req: &QuotaUsageRequest) -> QuotaResult<Value> {
        Ok(Value::Null)
    }
}

/// Linear two-stage composition: `prev` runs first and short-circuits the
/// chain on error; its result is otherwise discarded and `next` runs.
pub struct UpdateChain {
    prev: Arc<dyn UpdateQuotaUsage>,
    next: Arc<dyn UpdateQuotaUsage>,
}

impl UpdateChain {
    pub fn new(prev: Arc<dyn UpdateQuotaUsage>, next: Arc<dyn UpdateQuotaUsage>) -> Self {
        Self { prev, next }
    }
}

#[async_trait]
impl UpdateQuotaUsage for UpdateChain {
    async fn update(&self, req: &QuotaUsageRequest) -> QuotaResult<Value> {
        self.prev.update(req).await?;
        self.next.update(req).await
    }
}

/// Adapts a [`PrimeQuota`] into a pipeline stage so priming can be chained
/// in front of a charge or refund. The usage amount is dropped from the
/// request; priming only needs the quota identity.
pub struct PrimeQuotaUsage {
    primer: Arc<dyn PrimeQuota>,
}

impl PrimeQuotaUsage {
    pub fn new(primer: Arc<dyn PrimeQuota>) -> Self {
        Self { primer }
    }
}

#[async_trait]
impl UpdateQuotaUsage for PrimeQuotaUsage {
    async fn update(&self, req: &QuotaUsageRequest) -> QuotaResult<Value> {
        self.primer.prime(&req.as_quota_request()).await?;
        Ok(Value::Null)
    }
}
