//! Error types for quota operations.
//!
//! Every error the engine surfaces is a [`QuotaError`]. Consumers identify
//! errors by kind with [`QuotaError::is`], which walks wrapped sources, so
//! identity survives arbitrary nesting (a [`QuotaError::MaxRetryExceeded`]
//! wrapping a [`QuotaError::LockedKey`] answers true for both kinds).

use thiserror::Error;

use crate::cache::CacheError;

/// Result type alias for quota operations.
pub type QuotaResult<T> = Result<T, QuotaError>;

/// Unified error type for all quota engine operations.
#[derive(Debug, Error)]
pub enum QuotaError {
    /// No quota applies to the request. From a key provider this means
    /// "skip the pipeline and delegate straight to `next`".
    #[error("quota not found: key {key}")]
    QuotaNotFound { key: String },

    /// A charge would have pushed the counter past its limit. `usage` is
    /// the counter value before the charge.
    #[error("quota limit exceeded: limit {limit} and usage {usage} for key {key}")]
    QuotaLimitExceeded { key: String, limit: i64, usage: i64 },

    /// A refund pushed the counter below zero. `usage` is the negative
    /// post-decrement total.
    #[error("invalid min quota usage: usage {usage} for key {key}")]
    InvalidMinQuotaUsage { key: String, usage: i64 },

    /// The cache increment (or a refund's compensation) failed in transit.
    #[error("error adding quota usage")]
    AddQuotaUsage(#[source] CacheError),

    /// The cache decrement (or a charge's compensation) failed in transit.
    #[error("error reducing quota usage")]
    ReduceQuotaUsage(#[source] CacheError),

    /// Another caller holds the priming lease for this key.
    #[error("locked key {key}")]
    LockedKey { key: String },

    /// All priming attempts failed; wraps the last attempt's error.
    #[error("max retry exceeded")]
    MaxRetryExceeded(#[source] Box<QuotaError>),

    /// The cache held a counter value that does not parse as an integer.
    #[error("malformed counter for key {key}: {value:?}")]
    MalformedCounter { key: String, value: String },

    /// A cache error surfaced verbatim.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// An error from caller-supplied code (a provider or a `next` action).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Stable identity of a [`QuotaError`], independent of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaErrorKind {
    QuotaNotFound,
    QuotaLimitExceeded,
    InvalidMinQuotaUsage,
    AddQuotaUsage,
    ReduceQuotaUsage,
    LockedKey,
    MaxRetryExceeded,
    MalformedCounter,
    CacheNotFound,
    Cache,
    Other,
}

impl QuotaError {
    /// The kind of this error, ignoring wrapped sources.
    pub fn kind(&self) -> QuotaErrorKind {
        match self {
            QuotaError::QuotaNotFound { .. } => QuotaErrorKind::QuotaNotFound,
            QuotaError::QuotaLimitExceeded { .. } => QuotaErrorKind::QuotaLimitExceeded,
            QuotaError::InvalidMinQuotaUsage { .. } => QuotaErrorKind::InvalidMinQuotaUsage,
            QuotaError::AddQuotaUsage(_) => QuotaErrorKind::AddQuotaUsage,
            QuotaError::ReduceQuotaUsage(_) => QuotaErrorKind::ReduceQuotaUsage,
            QuotaError::LockedKey { .. } => QuotaErrorKind::LockedKey,
            QuotaError::MaxRetryExceeded(_) => QuotaErrorKind::MaxRetryExceeded,
            QuotaError::MalformedCounter { .. } => QuotaErrorKind::MalformedCounter,
            QuotaError::Cache(CacheError::NotFound) => QuotaErrorKind::CacheNotFound,
            QuotaError::Cache(_) => QuotaErrorKind::Cache,
            QuotaError::Other(_) => QuotaErrorKind::Other,
        }
    }

    /// Whether this error, or any error it wraps, has the given kind.
    pub fn is(&self, kind: QuotaErrorKind) -> bool {
        if self.kind() == kind {
            return true;
        }
        match self {
            QuotaError::MaxRetryExceeded(inner) => inner.is(kind),
            QuotaError::AddQuotaUsage(source) | QuotaError::ReduceQuotaUsage(source) => {
                cache_kind(source) == kind
            }
            _ => false,
        }
    }
}

fn cache_kind(err: &CacheError) -> QuotaErrorKind {
    match err {
        CacheError::NotFound => QuotaErrorKind::CacheNotFound,
        CacheError::Backend(_) => QuotaErrorKind::Cache,
    }
}
