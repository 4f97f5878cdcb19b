//! The refund pipeline: floor-enforced decrements with compensation.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::Cache;
use crate::error::{QuotaError, QuotaErrorKind, QuotaResult};
use crate::primer::{PrimerConfig, SetNxQuotaPrimer};
use crate::provider::{QuotaExpirationProvider, QuotaKeyProvider, QuotaProvider};
use crate::retry::RetryingQuotaPrimer;
use crate::types::QuotaUsageRequest;
use crate::update::{
    NopUpdateQuotaUsage, PrimeQuotaUsage, UpdateChain, UpdateQuotaUsage, UpdateQuotaUsageListener,
};

/// Options for a refund pipeline.
#[derive(Clone, Default)]
pub struct ReduceUsageOption {
    /// When positive, this amount is refunded instead of the request's
    /// `usage`. The `next` action still sees the request unchanged.
    pub modified_usage: i64,

    /// When true, a failing `next` action leaves the decrement in place
    /// instead of compensating. Floor breaches are always compensated.
    pub irreversible: bool,

    /// Observer of engine outcomes.
    pub listener: Option<Arc<dyn UpdateQuotaUsageListener>>,
}

/// Floor-enforced refund against a quota counter.
///
/// Symmetric to the charge pipeline, with the limit check replaced by a
/// zero floor and no limit provider. A decrement that lands below zero is
/// compensated and surfaced as [`QuotaError::InvalidMinQuotaUsage`].
pub struct ReduceQuotaUsage {
    cache: Arc<dyn Cache>,
    quota_key: Arc<dyn QuotaKeyProvider>,
    next: Arc<dyn UpdateQuotaUsage>,
    option: ReduceUsageOption,
}

impl ReduceQuotaUsage {
    pub fn new(
        cache: Arc<dyn Cache>,
        quota_key: Arc<dyn QuotaKeyProvider>,
        next: Arc<dyn UpdateQuotaUsage>,
        option: ReduceUsageOption,
    ) -> Self {
        Self {
            cache,
            quota_key,
            next,
            option,
        }
    }

    /// Start assembling a refund pipeline; see [`ReduceQuotaUsageBuilder`].
    pub fn builder() -> ReduceQuotaUsageBuilder {
        ReduceQuotaUsageBuilder::default()
    }

    fn report(&self, req: &QuotaUsageRequest, err: QuotaError) -> QuotaResult<Value> {
        if let Some(listener) = &self.option.listener {
            listener.on_error(req, &err);
        }
        Err(err)
    }

    async fn reverse(&self, key: &str, amount: i64) -> QuotaResult<()> {
        match self.cache.incr_by(key, amount).await {
            Ok(_) => Ok(()),
            Err(err) => {
                warn!(key, amount, error = %err, "failed to reverse refund");
                Err(QuotaError::AddQuotaUsage(err))
            }
        }
    }
}

#[async_trait]
impl UpdateQuotaUsage for ReduceQuotaUsage {
    async fn update(&self, req: &QuotaUsageRequest) -> QuotaResult<Value> {
        let quota_req = req.as_quota_request();

        let key = match self.quota_key.quota_key(&quota_req).await {
            Ok(key) => key,
            // No quota applies: skip the refund and hand straight over.
            Err(err) if err.is(QuotaErrorKind::QuotaNotFound) => {
                return self.next.update(req).await;
            }
            Err(err) => return self.report(req, err),
        };

        let amount = if self.option.modified_usage > 0 {
            self.option.modified_usage
        } else {
            req.usage
        };

        let total = match self.cache.decr_by(&key, amount).await {
            Ok(total) => total,
            Err(err) => return self.report(req, QuotaError::ReduceQuotaUsage(err)),
        };
        debug!(key = %key, amount, total, "refunded quota usage");

        if total < 0 {
            let breached = QuotaError::InvalidMinQuotaUsage {
                key: key.clone(),
                usage: total,
            };
            let err = match self.reverse(&key, amount).await {
                Ok(()) => breached,
                Err(reverse_err) => reverse_err,
            };
            return self.report(req, err);
        }

        match self.next.update(req).await {
            Ok(res) => {
                if let Some(listener) = &self.option.listener {
                    listener.on_success(req, total);
                }
                Ok(res)
            }
            Err(next_err) => {
                if self.option.irreversible {
                    return Err(next_err);
                }
                match self.reverse(&key, amount).await {
                    // The caller owns the next-error on its return path;
                    // the listener only reports engine outcomes.
                    Ok(()) => Err(next_err),
                    Err(reverse_err) => self.report(req, reverse_err),
                }
            }
        }
    }
}

/// Assembles a refund pipeline; mirrors the charge builder without a
/// limit provider.
///
/// # Panics
///
/// `build` panics when `cache` or `quota_key` is missing, or when a usage
/// provider is supplied without an expiration provider.
#[derive(Default)]
pub struct ReduceQuotaUsageBuilder {
    cache: Option<Arc<dyn Cache>>,
    quota_key: Option<Arc<dyn QuotaKeyProvider>>,
    quota_usage: Option<Arc<dyn QuotaProvider>>,
    quota_expiration: Option<Arc<dyn QuotaExpirationProvider>>,
    next: Option<Arc<dyn UpdateQuotaUsage>>,
    primer_config: PrimerConfig,
    option: ReduceUsageOption,
}

impl ReduceQuotaUsageBuilder {
    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn quota_key(mut self, provider: Arc<dyn QuotaKeyProvider>) -> Self {
        self.quota_key = Some(provider);
        self
    }

    /// Authoritative usage baseline; supplying it enables lazy priming.
    pub fn quota_usage(mut self, provider: Arc<dyn QuotaProvider>) -> Self {
        self.quota_usage = Some(provider);
        self
    }

    pub fn quota_expiration(mut self, provider: Arc<dyn QuotaExpirationProvider>) -> Self {
        self.quota_expiration = Some(provider);
        self
    }

    pub fn next(mut self, next: Arc<dyn UpdateQuotaUsage>) -> Self {
        self.next = Some(next);
        self
    }

    pub fn primer_config(mut self, config: PrimerConfig) -> Self {
        self.primer_config = config;
        self
    }

    pub fn option(mut self, option: ReduceUsageOption) -> Self {
        self.option = option;
        self
    }

    pub fn build(self) -> Arc<dyn UpdateQuotaUsage> {
        let cache = self.cache.expect("cache is required");
        let quota_key = self.quota_key.expect("quota key provider is required");
        let next = self.next.unwrap_or_else(|| Arc::new(NopUpdateQuotaUsage));

        let refund: Arc<dyn UpdateQuotaUsage> = Arc::new(ReduceQuotaUsage::new(
            cache.clone(),
            quota_key.clone(),
            next,
            self.option,
        ));

        match self.quota_usage {
            Some(quota_usage) => {
                let quota_expiration = self
                    .quota_expiration
                    .expect("quota expiration provider is required when a usage provider is set");
                let primer = SetNxQuotaPrimer::new(
                    cache,
                    quota_key,
                    quota_expiration,
                    quota_usage,
                    self.primer_config.lock_in(),
                );
                let primer = RetryingQuotaPrimer::new(
                    Arc::new(primer),
                    self.primer_config.max_retry(),
                    self.primer_config.retry_in(),
                );
                Arc::new(UpdateChain::new(
                    Arc::new(PrimeQuotaUsage::new(Arc::new(primer))),
                    refund,
                ))
            }
            None => refund,
        }
    }
}
