//! The charge pipeline: limit-enforced increments with compensation.

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

/// Options for a charge pipeline.
#[derive(Clone, Default)]
pub struct AddUsageOption {
    /// When positive, this amount is charged instead of the request's
    /// `usage`. The `next` action still sees the request unchanged, and a
    /// listener's `updated_usage` is the cache post-value, which reflects
    /// this override.
    pub modified_usage: i64,

    /// When true, a failing `next` action leaves the increment in place
    /// instead of compensating. Limit breaches are always compensated.
    pub irreversible: bool,

    /// Observer of engine outcomes.
    pub listener: Option<Arc<dyn UpdateQuotaUsageListener>>,
}

/// Limit-enforced charge against a quota counter.
///
/// The increment and the limit check are not transactional: two racing
/// callers can both pass the check and each observes its own post-value.
/// Whichever lands past the limit compensates itself.
pub struct AddQuotaUsage {
    cache: Arc<dyn Cache>,
    quota_key: Arc<dyn QuotaKeyProvider>,
    quota_limit: Arc<dyn QuotaProvider>,
    next: Arc<dyn UpdateQuotaUsage>,
    option: AddUsageOption,
}

impl AddQuotaUsage {
    pub fn new(
        cache: Arc<dyn Cache>,
        quota_key: Arc<dyn QuotaKeyProvider>,
        quota_limit: Arc<dyn QuotaProvider>,
        next: Arc<dyn UpdateQuotaUsage>,
        option: AddUsageOption,
    ) -> Self {
        Self {
            cache,
            quota_key,
            quota_limit,
            next,
            option,
        }
    }

    /// Start assembling a charge pipeline; see [`AddQuotaUsageBuilder`].
    pub fn builder() -> AddQuotaUsageBuilder {
        AddQuotaUsageBuilder::default()
    }

    fn report(&self, req: &QuotaUsageRequest, err: QuotaError) -> QuotaResult<Value> {
        if let Some(listener) = &self.option.listener {
            listener.on_error(req, &err);
        }
        Err(err)
    }

    async fn reverse(&self, key: &str, amount: i64) -> QuotaResult<()> {
        match self.cache.decr_by(key, amount).await {
            Ok(_) => Ok(()),
            Err(err) => {
                warn!(key, amount, error = %err, "failed to reverse charge");
                Err(QuotaError::ReduceQuotaUsage(err))
            }
        }
    }
}

#[async_trait]
impl UpdateQuotaUsage for AddQuotaUsage {
    async fn update(&self, req: &QuotaUsageRequest) -> QuotaResult<Value> {
        let quota_req = req.as_quota_request();

        let key = match self.quota_key.quota_key(&quota_req).await {
            Ok(key) => key,
            // No quota applies: skip the charge and hand straight over.
            Err(err) if err.is(QuotaErrorKind::QuotaNotFound) => {
                return self.next.update(req).await;
            }
            Err(err) => return self.report(req, err),
        };

        let limit = match self.quota_limit.quota(&quota_req).await {
            Ok(limit) => limit,
            Err(err) => return self.report(req, err),
        };

        let amount = if self.option.modified_usage > 0 {
            self.option.modified_usage
        } else {
            req.usage
        };

        let total = match self.cache.incr_by(&key, amount).await {
            Ok(total) => total,
            Err(err) => return self.report(req, QuotaError::AddQuotaUsage(err)),
        };
        debug!(key = %key, amount, total, limit, "charged quota usage");

        if total > limit {
            let exceeded = QuotaError::QuotaLimitExceeded {
                key: key.clone(),
                limit,
                usage: total - amount,
            };
            let err = match self.reverse(&key, amount).await {
                Ok(()) => exceeded,
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

/// Assembles a charge pipeline per the engine's wiring rules: an absent
/// `next` becomes a no-op stage, and supplying a usage provider prepends a
/// lease-based primer (with retries) in front of the charge.
///
/// # Panics
///
/// `build` panics when a required field (`cache`, `quota_key`,
/// `quota_limit`) is missing, or when a usage provider is supplied without
/// an expiration provider. These are programmer errors, distinct from
/// request-time [`QuotaError`]s.
#[derive(Default)]
pub struct AddQuotaUsageBuilder {
    cache: Option<Arc<dyn Cache>>,
    quota_key: Option<Arc<dyn QuotaKeyProvider>>,
    quota_limit: Option<Arc<dyn QuotaProvider>>,
    quota_usage: Option<Arc<dyn QuotaProvider>>,
    quota_expiration: Option<Arc<dyn QuotaExpirationProvider>>,
    next: Option<Arc<dyn UpdateQuotaUsage>>,
    primer_config: PrimerConfig,
    option: AddUsageOption,
}

impl AddQuotaUsageBuilder {
    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn quota_key(mut self, provider: Arc<dyn QuotaKeyProvider>) -> Self {
        self.quota_key = Some(provider);
        self
    }

    pub fn quota_limit(mut self, provider: Arc<dyn QuotaProvider>) -> Self {
        self.quota_limit = Some(provider);
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

    pub fn option(mut self, option: AddUsageOption) -> Self {
        self.option = option;
        self
    }

    pub fn build(self) -> Arc<dyn UpdateQuotaUsage> {
        let cache = self.cache.expect("cache is required");
        let quota_key = self.quota_key.expect("quota key provider is required");
        let quota_limit = self.quota_limit.expect("quota limit provider is required");
        let next = self.next.unwrap_or_else(|| Arc::new(NopUpdateQuotaUsage));

        let charge: Arc<dyn UpdateQuotaUsage> = Arc::new(AddQuotaUsage::new(
            cache.clone(),
            quota_key.clone(),
            quota_limit,
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
                    charge,
                ))
            }
            None => charge,
        }
    }
}
