//! End-to-end refund scenarios against a recording cache.

use std::sync::Arc;

use serde_json::json;

use usagegate::{
    AddQuotaUsage, CachedQuota, QuotaErrorKind, QuotaProvider, QuotaRequest, QuotaUsageRequest,
    ReduceQuotaUsage, ReduceUsageOption, UpdateQuotaUsage,
};
use usagegate_integration_tests::common::{
    usage_key, CacheOp, CollectingListener, Next, RecordingCache, StaticQuota, UsageKey,
};

fn refund(
    cache: Arc<RecordingCache>,
    next: Arc<dyn UpdateQuotaUsage>,
    option: ReduceUsageOption,
) -> Arc<dyn UpdateQuotaUsage> {
    ReduceQuotaUsage::builder()
        .cache(cache)
        .quota_key(Arc::new(UsageKey))
        .next(next)
        .option(option)
        .build()
}

#[tokio::test]
async fn refund_above_floor_commits_and_notifies() {
    let cache = Arc::new(RecordingCache::new());
    cache.seed(&usage_key("q"), "1500").await;
    let listener = Arc::new(CollectingListener::default());
    let pipeline = refund(
        cache.clone(),
        Next::ok(json!("released")),
        ReduceUsageOption {
            listener: Some(listener.clone()),
            ..Default::default()
        },
    );

    let res = pipeline
        .update(&QuotaUsageRequest::new("q", 1000))
        .await
        .unwrap();

    assert_eq!(res, json!("released"));
    assert_eq!(cache.peek(&usage_key("q")).await.unwrap(), "500");
    assert_eq!(listener.successes(), vec![("q".to_string(), 500)]);
}

#[tokio::test]
async fn refund_below_zero_is_compensated_before_return() {
    let cache = Arc::new(RecordingCache::new());
    cache.seed(&usage_key("q"), "500").await;
    let pipeline = refund(
        cache.clone(),
        Next::ok(json!("unreached")),
        ReduceUsageOption::default(),
    );

    let err = pipeline
        .update(&QuotaUsageRequest::new("q", 1000))
        .await
        .unwrap_err();

    assert!(err.is(QuotaErrorKind::InvalidMinQuotaUsage));
    assert_eq!(
        err.to_string(),
        format!("invalid min quota usage: usage -500 for key {}", usage_key("q"))
    );
    assert_eq!(
        cache.ops(),
        vec![
            CacheOp::DecrBy {
                key: usage_key("q"),
                value: 1000,
            },
            CacheOp::IncrBy {
                key: usage_key("q"),
                value: 1000,
            },
        ]
    );
    assert_eq!(cache.peek(&usage_key("q")).await.unwrap(), "500");
}

#[tokio::test]
async fn refund_landing_exactly_on_zero_passes() {
    let cache = Arc::new(RecordingCache::new());
    cache.seed(&usage_key("q"), "1000").await;
    let pipeline = refund(cache.clone(), Next::ok(json!(null)), ReduceUsageOption::default());

    pipeline
        .update(&QuotaUsageRequest::new("q", 1000))
        .await
        .unwrap();

    assert_eq!(cache.peek(&usage_key("q")).await.unwrap(), "0");
}

#[tokio::test]
async fn sync_loop_reads_the_live_counter() {
    let cache = Arc::new(RecordingCache::new());
    cache.seed(&usage_key("q"), "1500").await;
    let pipeline = refund(cache.clone(), Next::ok(json!(null)), ReduceUsageOption::default());

    pipeline
        .update(&QuotaUsageRequest::new("q", 300))
        .await
        .unwrap();

    let reader = CachedQuota::new(cache.clone(), Arc::new(UsageKey));
    let usage = reader.quota(&QuotaRequest::new("q")).await.unwrap();

    assert_eq!(usage, 1200);
    assert_eq!(
        cache.ops().last(),
        Some(&CacheOp::Get {
            key: usage_key("q"),
        })
    );
}

#[tokio::test]
async fn charge_then_refund_restores_the_counter() {
    let cache = Arc::new(RecordingCache::new());
    cache.seed(&usage_key("q"), "4200").await;

    let charge = AddQuotaUsage::builder()
        .cache(cache.clone())
        .quota_key(Arc::new(UsageKey))
        .quota_limit(Arc::new(StaticQuota(10000)))
        .build();
    let refund = refund(cache.clone(), Next::ok(json!(null)), ReduceUsageOption::default());

    charge
        .update(&QuotaUsageRequest::new("q", 777))
        .await
        .unwrap();
    refund
        .update(&QuotaUsageRequest::new("q", 777))
        .await
        .unwrap();

    assert_eq!(cache.peek(&usage_key("q")).await.unwrap(), "4200");
}
