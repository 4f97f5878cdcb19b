//! # usagegate
//!
//! Distributed quota usage engine over an atomic key-value cache.
//!
//! ## Overview
//!
//! The engine tracks per-identity counters in a shared cache and lets
//! callers:
//!
//! - **Charge**: add an amount, failing (and undoing the add) when the
//!   counter would exceed its limit
//! - **Refund**: reduce an amount, failing (and undoing the reduction)
//!   when the counter would drop below zero
//! - **Compose**: run a caller-supplied follow-on action (typically a
//!   database write) inside the same logical operation; its failure
//!   triggers compensation unless the charge is marked irreversible
//! - **Prime lazily**: on first touch, the counter is seeded from the
//!   authoritative store under a cache-level lease, with bounded retries
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         usagegate                           │
//! │   ┌──────────┐   ┌───────────┐   ┌───────────────────────┐  │
//! │   │  Primer  │ → │  Charge / │ → │  next action          │  │
//! │   │ (+retry) │   │  Refund   │   │  (caller-supplied)    │  │
//! │   └──────────┘   └───────────┘   └───────────────────────┘  │
//! │         ↓               ↓                    ↓              │
//! │   ┌──────────────────────────────────────────────────────┐  │
//! │   │        Cache (Redis / in-memory, 7 atomic ops)       │  │
//! │   └──────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every stage satisfies [`UpdateQuotaUsage`] and stages compose by value:
//! the builders chain a primer in front of a charge or refund whenever an
//! authoritative usage provider is supplied.
//!
//! ## Consistency
//!
//! Counter arithmetic is atomic at the cache, but bound checks are not
//! transactional with it: racing callers past a limit each compensate
//! themselves, and a future dropped mid-operation can leave a mutation
//! uncompensated. The design target is best-effort quota with an
//! out-of-band sync loop (see [`CachedQuota`]) reconciling counters back
//! to authoritative storage.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use async_trait::async_trait;
//! use usagegate::{
//!     AddQuotaUsage, MemoryCache, QuotaKeyProvider, QuotaProvider, QuotaRequest,
//!     QuotaResult, QuotaUsageRequest, UpdateQuotaUsage,
//! };
//!
//! struct VoucherKey;
//!
//! #[async_trait]
//! impl QuotaKeyProvider for VoucherKey {
//!     async fn quota_key(&self, req: &QuotaRequest) -> QuotaResult<String> {
//!         Ok(format!("voucher-quota-usage-{}", req.quota_id))
//!     }
//! }
//!
//! struct VoucherLimit;
//!
//! #[async_trait]
//! impl QuotaProvider for VoucherLimit {
//!     async fn quota(&self, _req: &QuotaRequest) -> QuotaResult<i64> {
//!         Ok(10_000)
//!     }
//! }
//!
//! # async fn run() -> QuotaResult<()> {
//! let charge = AddQuotaUsage::builder()
//!     .cache(Arc::new(MemoryCache::new()))
//!     .quota_key(Arc::new(VoucherKey))
//!     .quota_limit(Arc::new(VoucherLimit))
//!     .build();
//!
//! charge.update(&QuotaUsageRequest::new("voucher-1", 1)).await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod cached_quota;
pub mod charge;
pub mod error;
pub mod primer;
pub mod provider;
pub mod refund;
pub mod retry;
pub mod types;
pub mod update;

#[cfg(test)]
pub(crate) mod testutil;

pub use cache::memory::MemoryCache;
pub use cache::redis::RedisCache;
pub use cache::{Cache, CacheError};
pub use cached_quota::CachedQuota;
pub use charge::{AddQuotaUsage, AddQuotaUsageBuilder, AddUsageOption};
pub use error::{QuotaError, QuotaErrorKind, QuotaResult};
pub use primer::{lock_key, PrimeQuota, PrimerConfig, SetNxQuotaPrimer};
pub use provider::{QuotaExpirationProvider, QuotaKeyProvider, QuotaProvider};
pub use refund::{ReduceQuotaUsage, ReduceQuotaUsageBuilder, ReduceUsageOption};
pub use retry::RetryingQuotaPrimer;
pub use types::{QuotaRequest, QuotaUsageRequest};
pub use update::{
    NopUpdateQuotaUsage, PrimeQuotaUsage, UpdateChain, UpdateQuotaUsage,
    UpdateQuotaUsageListener,
};
