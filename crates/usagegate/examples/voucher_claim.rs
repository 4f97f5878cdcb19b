//! Voucher claim flow over an in-memory cache.
//!
//! A voucher has a claim limit stored in an application-side repository.
//! Claims charge the quota engine; the engine primes the counter from the
//! repository on first touch, records the claim as the `next` action, and
//! refunds on cancellation. A final sync-loop read shows how counters are
//! reconciled back to the store.
//!
//! Run with: `cargo run --example voucher_claim`

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::info;

use usagegate::{
    AddQuotaUsage, CachedQuota, MemoryCache, PrimerConfig, QuotaError, QuotaKeyProvider,
    QuotaProvider, QuotaRequest, QuotaResult, QuotaUsageRequest, ReduceQuotaUsage,
    AddUsageOption, QuotaExpirationProvider, UpdateQuotaUsage, UpdateQuotaUsageListener,
};

#[derive(Clone)]
struct Voucher {
    limit: i64,
    usage: i64,
}

#[derive(Default)]
struct VoucherRepository {
    vouchers: RwLock<HashMap<String, Voucher>>,
}

impl VoucherRepository {
    async fn insert(&self, id: &str, voucher: Voucher) {
        self.vouchers.write().await.insert(id.to_string(), voucher);
    }

    async fn find(&self, id: &str) -> QuotaResult<Voucher> {
        self.vouchers
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| QuotaError::QuotaNotFound { key: id.to_string() })
    }
}

struct VoucherQuotaKey;

#[async_trait]
impl QuotaKeyProvider for VoucherQuotaKey {
    async fn quota_key(&self, req: &QuotaRequest) -> QuotaResult<String> {
        Ok(format!("voucher-quota-usage-{}", req.quota_id))
    }
}

struct VoucherQuotaLimit {
    repo: Arc<VoucherRepository>,
}

#[async_trait]
impl QuotaProvider for VoucherQuotaLimit {
    async fn quota(&self, req: &QuotaRequest) -> QuotaResult<i64> {
        Ok(self.repo.find(&req.quota_id).await?.limit)
    }
}

struct VoucherQuotaUsage {
    repo: Arc<VoucherRepository>,
}

#[async_trait]
impl QuotaProvider for VoucherQuotaUsage {
    async fn quota(&self, req: &QuotaRequest) -> QuotaResult<i64> {
        Ok(self.repo.find(&req.quota_id).await?.usage)
    }
}

struct VoucherQuotaExpiration;

#[async_trait]
impl QuotaExpirationProvider for VoucherQuotaExpiration {
    async fn expiration(&self, _req: &QuotaRequest) -> QuotaResult<Duration> {
        Ok(Duration::from_secs(300))
    }
}

/// `next` action: records the claim the way an application would write a
/// history row.
struct RecordClaim;

#[async_trait]
impl UpdateQuotaUsage for RecordClaim {
    async fn update(&self, req: &QuotaUsageRequest) -> QuotaResult<serde_json::Value> {
        Ok(json!({ "claimed": req.quota_id, "amount": req.usage }))
    }
}

struct LogListener;

impl UpdateQuotaUsageListener for LogListener {
    fn on_success(&self, req: &QuotaUsageRequest, updated_usage: i64) {
        info!(quota_id = %req.quota_id, updated_usage, "quota usage updated");
    }

    fn on_error(&self, req: &QuotaUsageRequest, err: &QuotaError) {
        info!(quota_id = %req.quota_id, error = %err, "quota update failed");
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let repo = Arc::new(VoucherRepository::default());
    repo.insert("weekend-promo", Voucher { limit: 5, usage: 3 })
        .await;

    let cache = Arc::new(MemoryCache::new());
    let quota_key = Arc::new(VoucherQuotaKey);

    let claim = AddQuotaUsage::builder()
        .cache(cache.clone())
        .quota_key(quota_key.clone())
        .quota_limit(Arc::new(VoucherQuotaLimit { repo: repo.clone() }))
        .quota_usage(Arc::new(VoucherQuotaUsage { repo: repo.clone() }))
        .quota_expiration(Arc::new(VoucherQuotaExpiration))
        .primer_config(PrimerConfig {
            lock_in: Duration::from_secs(5),
            max_retry: 10,
            retry_in: Duration::from_millis(100),
        })
        .next(Arc::new(RecordClaim))
        .option(AddUsageOption {
            listener: Some(Arc::new(LogListener)),
            ..Default::default()
        })
        .build();

    let cancel = ReduceQuotaUsage::builder()
        .cache(cache.clone())
        .quota_key(quota_key.clone())
        .build();

    // Two claims fit: the counter primes at 3 against a limit of 5.
    for _ in 0..2 {
        let res = claim
            .update(&QuotaUsageRequest::new("weekend-promo", 1))
            .await?;
        info!(%res, "claim accepted");
    }

    // The third claim breaches the limit and is compensated.
    match claim
        .update(&QuotaUsageRequest::new("weekend-promo", 1))
        .await
    {
        Ok(_) => unreachable!("voucher is exhausted"),
        Err(err) => info!(%err, "claim rejected"),
    }

    // A cancellation frees one claim.
    cancel
        .update(&QuotaUsageRequest::new("weekend-promo", 1))
        .await?;

    // What a sync loop would read back into the voucher repository.
    let reader = CachedQuota::new(cache, quota_key);
    let usage = reader
        .quota(&QuotaRequest::new("weekend-promo"))
        .await?;
    info!(usage, "counter after claims and one cancellation");

    Ok(())
}
