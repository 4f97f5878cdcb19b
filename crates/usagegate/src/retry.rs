//! Bounded retries around a primer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{QuotaError, QuotaResult};
use crate::primer::PrimeQuota;
use crate::types::QuotaRequest;

/// Retries an inner [`PrimeQuota`] up to `max_retry` times, pausing
/// `retry_in` between attempts (never after the last). When every attempt
/// fails, the last error is wrapped in [`QuotaError::MaxRetryExceeded`];
/// kind identity of the inner error survives the wrap.
pub struct RetryingQuotaPrimer {
    inner: Arc<dyn PrimeQuota>,
    max_retry: u32,
    retry_in: Duration,
}

impl RetryingQuotaPrimer {
    pub fn new(inner: Arc<dyn PrimeQuota>, max_retry: u32, retry_in: Duration) -> Self {
        Self {
            inner,
            max_retry: max_retry.max(1),
            retry_in,
        }
    }
}

#[async_trait]
impl PrimeQuota for RetryingQuotaPrimer {
    async fn prime(&self, req: &QuotaRequest) -> QuotaResult<()> {
        let mut attempt = 1;
        loop {
            match self.inner.prime(req).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt >= self.max_retry => {
                    return Err(QuotaError::MaxRetryExceeded(Box::new(err)));
                }
                Err(err) => {
                    debug!(attempt, error = %err, "prime attempt failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(self.retry_in).await;
                }
            }
        }
    }
}
