// Daily analytics under concurrent load and lazy byte backfill
//
// - N concurrent resolutions count exactly N requests, one unique per miss
// - an unknown entry size is measured over HTTP and counted exactly once
// - probe failures leave the size unknown without failing the request

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use thumbgate::analytics::{AnalyticEvent, AnalyticsAggregator, HttpSizeProbe};
use thumbgate::resolver::ResolveKind;
use thumbgate::store::{CacheKey, ImageStore, NewCacheEntry};

use super::test_harness::*;

async fn seed_entry(store: &dyn ImageStore, transformation: &str, size: Option<i64>) -> i64 {
    let id = store
        .insert_cache_entry(&NewCacheEntry {
            user_id: USER_ID,
            project_id: PROJECT_ID,
            image_key: "c2lnbmF0dXJl".to_string(),
            origin: "https://img.example.com".to_string(),
            origin_path: "cat.jpg".to_string(),
            transformation: transformation.to_string(),
            is_smart: false,
            cdn_path: "/results/c2lnbmF0dXJl/cat.jpg".to_string(),
        })
        .await
        .unwrap();
    if let Some(size) = size {
        assert!(store.update_cache_entry_size(id, size).await.unwrap());
    }
    id
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_resolutions_conserve_counts() {
    let probe = FixedProbe::ok(1);
    let h = harness(probe.clone(), cdn("cdn.example.com")).await;
    seed_entry(h.store.as_ref(), "s:100x100", Some(500)).await;

    let mut tasks = Vec::new();
    for i in 0..50u32 {
        let resolver = h.resolver.clone();
        let transformation = if i % 5 == 0 {
            format!("s:{}x{}", i + 1, i + 1)
        } else {
            "s:100x100".to_string()
        };
        tasks.push(tokio::spawn(async move {
            let resolution = resolver
                .resolve(request(&transformation, "cat.jpg"))
                .await
                .unwrap();
            let kind = resolution.result.kind();
            resolution.bookkeeping.await.unwrap();
            kind
        }));
    }

    let mut misses = 0;
    for task in tasks {
        if task.await.unwrap() == ResolveKind::Miss {
            misses += 1;
        }
    }
    assert_eq!(misses, 10);

    let row = h
        .store
        .find_today_analytic(PROJECT_ID, today())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.total_request, 50);
    assert_eq!(row.uniq_request, 10);
    // Sizes already known add no bytes.
    assert_eq!(row.total_bytes, 0);
    assert_eq!(probe.calls(), 0);
}

#[tokio::test]
async fn test_unknown_size_is_backfilled_from_cdn_once() {
    let (cdn_host, cdn_requests) = start_cdn_mock(12345).await;
    let probe = Arc::new(HttpSizeProbe::new(Duration::from_secs(2)).unwrap());
    let h = harness(probe, cdn(&cdn_host)).await;
    let entry_id = seed_entry(h.store.as_ref(), "s:300x200", None).await;

    let mut req = request("s:300x200", "cat.jpg");
    req.project = project("http");

    for _ in 0..3 {
        let resolution = h.resolver.resolve(req.clone()).await.unwrap();
        assert_eq!(resolution.result.kind(), ResolveKind::Hit);
        resolution.bookkeeping.await.unwrap();
    }

    let key = CacheKey {
        project_id: PROJECT_ID,
        origin_path: "cat.jpg".to_string(),
        transformation: "s:300x200".to_string(),
        smart: false,
    };
    let entry = h.store.find_cache_entry(&key).await.unwrap().unwrap();
    assert_eq!(entry.id, entry_id);
    assert_eq!(entry.file_size, Some(12345));

    let row = h
        .store
        .find_today_analytic(PROJECT_ID, today())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.total_request, 3);
    assert_eq!(row.uniq_request, 0);
    // Measured on the first hit; later hits see the stored size.
    assert_eq!(row.total_bytes, 12345);
    assert_eq!(cdn_requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_racing_backfills_count_bytes_once() {
    let (store, _dir) = temp_store().await;
    let entry_id = seed_entry(store.as_ref(), "s:300x200", None).await;
    let aggregator = AnalyticsAggregator::new(store.clone(), FixedProbe::ok(12345));

    let event = AnalyticEvent::Hit {
        entry_id,
        size: None,
        probe_url: "https://cdn.example.com/c2lnbmF0dXJl/cat.jpg".to_string(),
    };
    let p = project("https");
    let (a, b) = tokio::join!(
        aggregator.record_on(&p, event.clone(), today()),
        aggregator.record_on(&p, event, today())
    );
    assert_eq!(a.bytes + b.bytes, 12345);

    let row = store
        .find_today_analytic(PROJECT_ID, today())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.total_request, 2);
    assert_eq!(row.total_bytes, 12345);
}

#[tokio::test]
async fn test_probe_failure_keeps_request_counted() {
    let probe = FixedProbe::failing();
    let h = harness(probe.clone(), cdn("cdn.example.com")).await;
    seed_entry(h.store.as_ref(), "s:300x200", None).await;

    let resolution = h
        .resolver
        .resolve(request("s:300x200", "cat.jpg"))
        .await
        .unwrap();
    resolution.bookkeeping.await.unwrap();

    assert_eq!(probe.calls(), 1);
    let row = h
        .store
        .find_today_analytic(PROJECT_ID, today())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.total_request, 1);
    assert_eq!(row.total_bytes, 0);
}

#[tokio::test]
async fn test_misses_never_probe() {
    let probe = FixedProbe::ok(999);
    let h = harness(probe.clone(), cdn("cdn.example.com")).await;

    let resolution = h
        .resolver
        .resolve(request("s:10x10", "new.jpg"))
        .await
        .unwrap();
    assert_eq!(resolution.result.kind(), ResolveKind::Miss);
    resolution.bookkeeping.await.unwrap();

    assert_eq!(probe.calls(), 0);
}
