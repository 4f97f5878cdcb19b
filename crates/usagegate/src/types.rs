//! Request models for quota operations.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A request identifying a single quota.
///
/// `data` is an opaque payload that flows to the providers unmodified; the
/// engine never inspects it. Use it to carry whatever the providers need to
/// resolve keys, limits, or baselines (user IDs, voucher codes, and so on).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaRequest {
    /// Opaque quota identifier.
    pub quota_id: String,

    /// Caller payload, passed through to providers uninspected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl QuotaRequest {
    /// Create a request without payload.
    pub fn new(quota_id: impl Into<String>) -> Self {
        Self {
            quota_id: quota_id.into(),
            data: None,
        }
    }

    /// Attach an opaque payload.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// A request to charge or refund an amount against a quota.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaUsageRequest {
    /// Opaque quota identifier.
    pub quota_id: String,

    /// Amount to charge or refund. Must be non-negative.
    pub usage: i64,

    /// Caller payload, passed through to providers uninspected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl QuotaUsageRequest {
    /// Create a usage request without payload.
    pub fn new(quota_id: impl Into<String>, usage: i64) -> Self {
        Self {
            quota_id: quota_id.into(),
            usage,
            data: None,
        }
    }

    /// Attach an opaque payload.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// The provider-facing view of this request, with the amount dropped.
    pub fn as_quota_request(&self) -> QuotaRequest {
        QuotaRequest {
            quota_id: self.quota_id.clone(),
            data: self.data.clone(),
        }
    }
}
