//! Integration tests for ResultCache against the in-process backend.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use forum_search_cache::{MemoryBackend, ResultCache, SearchFilters};
use forum_search_types::{CacheConfig, SearchResult, VersionSettings};
use pretty_assertions::assert_eq;

fn enabled() -> CacheConfig {
    CacheConfig {
        enabled: true,
        prefix: "test:".into(),
        ..Default::default()
    }
}

fn results() -> Vec<SearchResult> {
    vec![
        SearchResult {
            id: Some(10),
            topic_id: Some(3),
            post_id: Some(10),
            board_id: Some(1),
            weight: 2500.0,
            content_in_index: true,
            needs_content_fetch: false,
            content: Some("Wymiana klocków hamulcowych".into()),
            subject: Some("Hamulce".into()),
        },
        SearchResult {
            id: Some(11),
            topic_id: Some(3),
            post_id: Some(11),
            board_id: None,
            weight: 1823.3521453552403,
            content_in_index: true,
            needs_content_fetch: false,
            content: None,
            subject: None,
        },
    ]
}

fn filters() -> SearchFilters {
    let mut filters = SearchFilters::new();
    filters.insert("index".into(), "forum_posts".into());
    filters.insert("limit".into(), 10.into());
    filters
}

#[tokio::test]
async fn test_store_then_lookup_round_trip() {
    let backend = Arc::new(MemoryBackend::new());
    let cache = ResultCache::with_backend(&enabled(), &VersionSettings::default(), backend);

    assert!(cache.store("hamulce", &filters(), &results(), None).await);

    let before = cache.search_stats().await.unwrap().cache_hits;
    let entry = cache.lookup("hamulce", &filters()).await.unwrap();
    let after = cache.search_stats().await.unwrap().cache_hits;

    assert_eq!(entry.results, results());
    assert_eq!(entry.count, 2);
    assert_eq!(entry.query, "hamulce");
    assert_eq!(entry.filters, filters());
    assert_eq!(after, before + 1);
}

#[tokio::test]
async fn test_fractional_weights_survive_the_cache() {
    let backend = Arc::new(MemoryBackend::new());
    let cache = ResultCache::with_backend(&enabled(), &VersionSettings::default(), backend);

    // Deterministic spread of weights in [0, 10000).
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    for i in 0..500 {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        let weight = (seed >> 11) as f64 / (1u64 << 53) as f64 * 10_000.0;

        let stored = vec![SearchResult {
            weight,
            ..results()[1].clone()
        }];
        let query = format!("waga {i}");
        assert!(cache.store(&query, &filters(), &stored, None).await);
        let entry = cache.lookup(&query, &filters()).await.unwrap();
        assert_eq!(entry.results[0].weight.to_bits(), weight.to_bits(), "weight {weight}");
    }
}

#[tokio::test]
async fn test_miss_is_counted() {
    let backend = Arc::new(MemoryBackend::new());
    let cache = ResultCache::with_backend(&enabled(), &VersionSettings::default(), backend);

    assert_eq!(cache.lookup("nieznane", &filters()).await, None);
    let stats = cache.search_stats().await.unwrap();
    assert_eq!(stats.cache_misses, 1);
    assert_eq!(stats.cache_hit_rate, 0.0);
}

#[tokio::test]
async fn test_version_change_misses_previous_entries() {
    let backend = Arc::new(MemoryBackend::new());
    let cache = ResultCache::with_backend(&enabled(), &VersionSettings::default(), backend);
    cache.store("hamulce", &filters(), &results(), None).await;
    let old_version = cache.schema_version();

    cache.set_version_settings(&VersionSettings {
        model_type: "openvino".into(),
        ..Default::default()
    });

    assert_ne!(cache.schema_version(), old_version);
    assert_eq!(cache.lookup("hamulce", &filters()).await, None);
}

#[tokio::test]
async fn test_different_filters_do_not_collide() {
    let backend = Arc::new(MemoryBackend::new());
    let cache = ResultCache::with_backend(&enabled(), &VersionSettings::default(), backend);
    cache.store("hamulce", &filters(), &results(), None).await;

    let mut other = filters();
    other.insert("limit".into(), 20.into());
    assert_eq!(cache.lookup("hamulce", &other).await, None);
}

#[tokio::test]
async fn test_disabled_cache_never_calls_backend() {
    let backend = Arc::new(MemoryBackend::new());
    let cache = ResultCache::with_backend(
        &CacheConfig::default(),
        &VersionSettings::default(),
        backend.clone(),
    );

    assert!(!cache.is_enabled());
    assert_eq!(cache.lookup("hamulce", &filters()).await, None);
    assert!(!cache.store("hamulce", &filters(), &results(), None).await);
    assert!(!cache.update_search_stats("hamulce", 2, Duration::from_millis(40)).await);
    assert_eq!(cache.search_stats().await, None);
    assert_eq!(cache.clear_search_cache().await, 0);
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_search_stats_aggregate() {
    let backend = Arc::new(MemoryBackend::new());
    let cache = ResultCache::with_backend(&enabled(), &VersionSettings::default(), backend);

    assert!(cache.update_search_stats("hamulce", 4, Duration::from_millis(100)).await);
    assert!(cache.update_search_stats("hamulce", 2, Duration::from_millis(300)).await);
    assert!(cache.update_search_stats("opony", 0, Duration::from_millis(200)).await);

    let stats = cache.search_stats().await.unwrap();
    assert_eq!(stats.total_searches, 3);
    assert_eq!(stats.popular_queries.len(), 2);
    assert_eq!(stats.popular_queries[0].query, "hamulce");
    assert_eq!(stats.popular_queries[0].score, 2.0);
    assert!((stats.avg_response_time - 0.2).abs() < 1e-9);
    assert_eq!(stats.avg_result_count, 2.0);

    assert_eq!(cache.daily_searches(Utc::now().date_naive()).await, 3);
}

#[tokio::test]
async fn test_response_samples_are_capped() {
    let backend = Arc::new(MemoryBackend::new());
    let cache = ResultCache::with_backend(&enabled(), &VersionSettings::default(), backend.clone());

    for i in 0..1005 {
        cache
            .update_search_stats(&format!("q{}", i % 20), i, Duration::from_millis(1))
            .await;
    }

    let stats = cache.search_stats().await.unwrap();
    assert_eq!(stats.total_searches, 1005);
    assert_eq!(stats.popular_queries.len(), 10);
    // Newest 100 samples are result counts 905..=1004.
    assert_eq!(stats.avg_result_count, 954.5);

    let key = cache.keys().stat("result_counts");
    let replies = forum_search_cache::CacheBackend::atomic(
        backend.as_ref(),
        &[forum_search_cache::CacheOp::LRange {
            key,
            start: 0,
            stop: -1,
        }],
    )
    .await
    .unwrap();
    let forum_search_cache::CacheReply::List(samples) = &replies[0] else {
        panic!("expected a list reply");
    };
    assert_eq!(samples.len(), 1000);
}

#[tokio::test]
async fn test_unreachable_backend_degrades_quietly() {
    let backend = Arc::new(MemoryBackend::new());
    let cache = ResultCache::with_backend(&enabled(), &VersionSettings::default(), backend.clone());
    cache.store("hamulce", &filters(), &results(), None).await;

    backend.set_offline(true);
    assert_eq!(cache.lookup("hamulce", &filters()).await, None);
    assert!(!cache.store("opony", &filters(), &results(), None).await);

    backend.set_offline(false);
    assert!(cache.lookup("hamulce", &filters()).await.is_some());
}
