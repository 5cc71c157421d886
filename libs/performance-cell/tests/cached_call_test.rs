// =====================================================================================
// PERFORMANCE CELL INTEGRATION TESTS - MEMOIZATION & CACHE STRATEGIES
// =====================================================================================

use assert_matches::assert_matches;
use async_trait::async_trait;
use mockall::mock;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use performance_cell::{
    BackendError, CacheBackend, CacheStrategy, PerformanceConfig, PerformanceError,
    PerformanceService, WarmupEntry,
};

mock! {
    pub Backend {}

    #[async_trait]
    impl CacheBackend for Backend {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError>;
        async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), BackendError>;
        async fn delete(&self, key: &str) -> Result<(), BackendError>;
    }
}

fn memory_service() -> PerformanceService {
    PerformanceService::new(PerformanceConfig::default())
}

async fn counted_lookup(counter: Arc<AtomicUsize>, answer: &str) -> anyhow::Result<String> {
    counter.fetch_add(1, Ordering::SeqCst);
    Ok(answer.to_string())
}

#[tokio::test]
async fn test_second_call_is_served_from_cache() {
    let service = memory_service();
    let counter = Arc::new(AtomicUsize::new(0));
    let args = json!({"service": "lambda"});

    let first = service
        .cached_call("explain_service", &args, Duration::from_secs(60), || {
            counted_lookup(counter.clone(), "serverless compute")
        })
        .await
        .unwrap();
    let second = service
        .cached_call("explain_service", &args, Duration::from_secs(60), || {
            counted_lookup(counter.clone(), "something else")
        })
        .await
        .unwrap();

    assert_eq!(first, "serverless compute");
    assert_eq!(second, "serverless compute");
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    let metrics = service.get_metrics().await;
    assert_eq!(metrics.cache_hits, 1);
    assert_eq!(metrics.cache_misses, 1);
    assert_eq!(metrics.request_count, 1);
    assert_eq!(metrics.cache_hit_rate, 50.0);
    assert!(metrics.avg_response_time_ms >= 0.0);
    assert!(metrics.min_response_time_ms <= metrics.max_response_time_ms);
}

#[tokio::test]
async fn test_different_args_are_computed_separately() {
    let service = memory_service();
    let counter = Arc::new(AtomicUsize::new(0));

    for region in ["us-east-1", "eu-west-1"] {
        service
            .cached_call("pricing", &json!({"region": region}), Duration::from_secs(60), || {
                counted_lookup(counter.clone(), region)
            })
            .await
            .unwrap();
    }

    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert_eq!(service.local_cache().len().await, 2);
}

#[tokio::test]
async fn test_argument_key_order_does_not_matter() {
    let service = memory_service();
    let counter = Arc::new(AtomicUsize::new(0));

    service
        .cached_call("lookup", &json!({"a": 1, "b": 2}), Duration::from_secs(60), || {
            counted_lookup(counter.clone(), "x")
        })
        .await
        .unwrap();
    service
        .cached_call("lookup", &json!({"b": 2, "a": 1}), Duration::from_secs(60), || {
            counted_lookup(counter.clone(), "y")
        })
        .await
        .unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_expired_entry_is_recomputed() {
    let service = memory_service();
    let counter = Arc::new(AtomicUsize::new(0));

    service
        .cached_call("short_lived", &(), Duration::from_secs(1), || counted_lookup(counter.clone(), "v1"))
        .await
        .unwrap();

    tokio::time::advance(Duration::from_millis(1100)).await;

    let value = service
        .cached_call("short_lived", &(), Duration::from_secs(1), || counted_lookup(counter.clone(), "v2"))
        .await
        .unwrap();

    assert_eq!(value, "v2");
    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert_eq!(service.get_metrics().await.cache_misses, 2);
}

#[tokio::test]
async fn test_operation_error_propagates_and_is_not_cached() {
    let service = memory_service();

    let result: Result<String, _> = service
        .cached_call("flaky", &(), Duration::from_secs(60), || async {
            Err(anyhow::anyhow!("upstream unavailable"))
        })
        .await;

    assert_matches!(result, Err(PerformanceError::Operation(e)) if e.to_string() == "upstream unavailable");
    assert!(service.local_cache().is_empty().await);

    let recovered = service
        .cached_call("flaky", &(), Duration::from_secs(60), || async { Ok::<_, anyhow::Error>("ok".to_string()) })
        .await
        .unwrap();
    assert_eq!(recovered, "ok");

    let metrics = service.get_metrics().await;
    assert_eq!(metrics.errors, 1);
    assert_eq!(metrics.cache_misses, 2);
}

#[tokio::test]
async fn test_invalidate_forces_recompute() {
    let service = memory_service();
    let counter = Arc::new(AtomicUsize::new(0));
    let args = json!({"id": 7});

    service
        .cached_call("profile", &args, Duration::from_secs(60), || counted_lookup(counter.clone(), "a"))
        .await
        .unwrap();
    service.invalidate_cache("profile", &args).await.unwrap();
    service
        .cached_call("profile", &args, Duration::from_secs(60), || counted_lookup(counter.clone(), "b"))
        .await
        .unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_cached_call_default_uses_configured_ttl() {
    let service = PerformanceService::new(PerformanceConfig::default().default_ttl(Duration::from_secs(120)));

    service
        .cached_call_default("defaults", &(), || async { Ok::<_, anyhow::Error>(1u32) })
        .await
        .unwrap();

    let key = service.cache_key("defaults", &()).unwrap();
    let entry = service.local_cache().peek_entry(&key).await.unwrap();
    let remaining = entry.remaining_ttl().unwrap();
    assert!(remaining <= Duration::from_secs(120));
    assert!(remaining > Duration::from_secs(100));
}

#[tokio::test]
async fn test_huge_ttl_is_cached_without_overflow() {
    let service = memory_service();
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let value = service
            .cached_call("forever", &(), Duration::from_secs(u64::MAX), || {
                counted_lookup(counter.clone(), "pinned")
            })
            .await
            .unwrap();
        assert_eq!(value, "pinned");
    }

    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_key_prefix_is_applied() {
    let service = PerformanceService::new(PerformanceConfig::default().key_prefix("tenant_a"));
    let key = service.cache_key("lookup", &json!({"q": 1})).unwrap();
    assert!(key.starts_with("tenant_a:lookup:"));
}

#[tokio::test]
async fn test_warmup_reports_per_entry_outcome() {
    let service = memory_service();

    let entries = vec![
        WarmupEntry::new("faq", json!({"topic": "billing"}), Duration::from_secs(60), || async {
            Ok("billing answer".to_string())
        }),
        WarmupEntry::new("faq", json!({"topic": "broken"}), Duration::from_secs(60), || async {
            Err(anyhow::anyhow!("source offline"))
        }),
        WarmupEntry::new("faq", json!({"topic": "limits"}), Duration::from_secs(60), || async {
            Ok("limits answer".to_string())
        }),
    ];

    let results = service.warmup_cache(entries).await;

    assert_eq!(results.len(), 3);
    assert!(results[0].success);
    assert!(!results[1].success);
    assert!(results[1].error.as_deref().unwrap().contains("source offline"));
    assert!(results[2].success);

    let hit: String = service
        .cached_call("faq", &json!({"topic": "billing"}), Duration::from_secs(60), || async {
            Ok("recomputed".to_string())
        })
        .await
        .unwrap();
    assert_eq!(hit, "billing answer");
    assert_eq!(service.get_metrics().await.errors, 1);
}

#[tokio::test]
async fn test_reset_metrics_keeps_cache_contents() {
    let service = memory_service();
    service
        .cached_call("kept", &(), Duration::from_secs(60), || async { Ok::<_, anyhow::Error>(5u8) })
        .await
        .unwrap();

    service.reset_metrics();

    let metrics = service.get_metrics().await;
    assert_eq!(metrics.request_count, 0);
    assert_eq!(metrics.cache_hit_rate, 0.0);
    assert_eq!(metrics.min_response_time_ms, 0.0);
    assert_eq!(metrics.cache_stats.size, 1);
}

// =====================================================================================
// DISTRIBUTED & HYBRID STRATEGIES
// =====================================================================================

#[tokio::test]
async fn test_distributed_backend_failure_is_treated_as_miss() {
    let mut backend = MockBackend::new();
    backend
        .expect_get()
        .times(1)
        .returning(|_| Err(BackendError::Unavailable("connection refused".to_string())));
    backend
        .expect_set()
        .times(1)
        .returning(|_, _, _| Err(BackendError::Unavailable("connection refused".to_string())));

    let service = PerformanceService::with_backend(
        PerformanceConfig::default().strategy(CacheStrategy::Distributed),
        Arc::new(backend),
    );

    let value = service
        .cached_call("remote", &(), Duration::from_secs(60), || async { Ok::<_, anyhow::Error>(9u32) })
        .await
        .unwrap();

    assert_eq!(value, 9);
    assert!(service.local_cache().is_empty().await);

    let metrics = service.get_metrics().await;
    assert_eq!(metrics.cache_misses, 1);
    assert_eq!(metrics.errors, 0);
}

#[tokio::test]
async fn test_hybrid_backend_hit_wins_over_local() {
    let service_key = PerformanceService::new(PerformanceConfig::default())
        .cache_key("shared", &())
        .unwrap();

    let mut backend = MockBackend::new();
    let expected_key = service_key.clone();
    backend
        .expect_get()
        .withf(move |key| key == expected_key.as_str())
        .returning(|_| Ok(Some(serde_json::to_vec(&"from backend").unwrap())));
    backend.expect_set().never();

    let service = PerformanceService::with_backend(
        PerformanceConfig::default().strategy(CacheStrategy::Hybrid),
        Arc::new(backend),
    );
    service
        .local_cache()
        .set(&service_key, json!("from local"), Duration::from_secs(60))
        .await;

    let value: String = service
        .cached_call("shared", &(), Duration::from_secs(60), || async { Ok("computed".to_string()) })
        .await
        .unwrap();

    assert_eq!(value, "from backend");
    assert_eq!(service.get_metrics().await.cache_hits, 1);
}

#[tokio::test]
async fn test_hybrid_backend_failure_falls_through_to_local() {
    let mut backend = MockBackend::new();
    backend
        .expect_get()
        .times(1)
        .returning(|_| Err(BackendError::Unavailable("timeout".to_string())));
    backend.expect_set().never();

    let service = PerformanceService::with_backend(
        PerformanceConfig::default().strategy(CacheStrategy::Hybrid),
        Arc::new(backend),
    );
    let key = service.cache_key("regions", &json!({"cloud": "aws"})).unwrap();
    service
        .local_cache()
        .set(&key, json!(["us-east-1", "eu-west-1"]), Duration::from_secs(60))
        .await;

    let invoked = Arc::new(AtomicUsize::new(0));
    let counter = invoked.clone();
    let regions: Vec<String> = service
        .cached_call("regions", &json!({"cloud": "aws"}), Duration::from_secs(60), || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(vec!["computed".to_string()])
        })
        .await
        .unwrap();

    assert_eq!(regions, vec!["us-east-1", "eu-west-1"]);
    assert_eq!(invoked.load(Ordering::SeqCst), 0);

    let metrics = service.get_metrics().await;
    assert_eq!(metrics.cache_hits, 1);
    assert_eq!(metrics.cache_misses, 0);
}

#[tokio::test]
async fn test_hybrid_miss_populates_both_tiers() {
    let mut backend = MockBackend::new();
    backend.expect_get().times(1).returning(|_| Ok(None));
    backend
        .expect_set()
        .withf(|_, value, ttl| value == b"\"fresh\"" && *ttl == Duration::from_secs(30))
        .times(1)
        .returning(|_, _, _| Ok(()));

    let service = PerformanceService::with_backend(
        PerformanceConfig::default().strategy(CacheStrategy::Hybrid),
        Arc::new(backend),
    );

    let value: String = service
        .cached_call("fresh", &(), Duration::from_secs(30), || async { Ok("fresh".to_string()) })
        .await
        .unwrap();

    assert_eq!(value, "fresh");
    assert_eq!(service.local_cache().len().await, 1);
}

#[tokio::test]
async fn test_invalidate_deletes_from_backend() {
    let mut backend = MockBackend::new();
    backend.expect_delete().times(1).returning(|_| Ok(()));

    let service = PerformanceService::with_backend(
        PerformanceConfig::default().strategy(CacheStrategy::Distributed),
        Arc::new(backend),
    );

    assert!(service.invalidate_cache("gone", &json!({"id": 1})).await.is_ok());
}

#[tokio::test]
async fn test_unknown_strategy_is_a_configuration_error() {
    let result = "sharded".parse::<CacheStrategy>();
    assert_matches!(result, Err(PerformanceError::InvalidConfiguration(_)));
}
