//! Integration tests for callcache
//!
//! These tests drive the public API the way an application would: named
//! functions wrapped with `memoize`, a shared backend, and operator-facing keys.

use callcache::prelude::*;
use callcache::{KeyConfig, MemoryBackend};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, Clone)]
struct Report {
    id: u32,
    region: String,
    rows: Vec<i32>,
}

static DOUBLE_CALLS: AtomicUsize = AtomicUsize::new(0);

async fn double(args: (u64,)) -> Result<u64> {
    DOUBLE_CALLS.fetch_add(1, Ordering::SeqCst);
    Ok(args.0 * 2)
}

static REPORT_CALLS: AtomicUsize = AtomicUsize::new(0);

async fn build_report(args: (u32, String)) -> Result<Report> {
    REPORT_CALLS.fetch_add(1, Ordering::SeqCst);
    let (id, region) = args;
    Ok(Report {
        id,
        region,
        rows: vec![1, 2, 3],
    })
}

async fn render_region(args: (u32, String)) -> Result<String> {
    Ok(format!("{}/{}", args.0, args.1))
}

async fn square(args: (u64,)) -> Result<u64> {
    Ok(args.0 * args.0)
}

struct ReportQuery {
    region: String,
    limit: usize,
    include_archived: bool,
}

impl CacheArgs for ReportQuery {
    fn key_args(&self) -> Result<KeyArgs> {
        KeyArgs::new()
            .arg(&self.region)?
            .kwarg("limit", &self.limit)?
            .kwarg("include_archived", &self.include_archived)
    }
}

/// Test the doubling example: one computation, then a hit.
#[tokio::test]
async fn test_wrapped_fn_item_miss_then_hit() {
    let cached = memoize(60).wrap(double).unwrap();
    assert_eq!(
        cached.identity().qualified_name(),
        "integration_tests.double"
    );

    let before = DOUBLE_CALLS.load(Ordering::SeqCst);
    assert_eq!(cached.call((3,)).await.unwrap(), 6);
    assert_eq!(cached.call((3,)).await.unwrap(), 6);
    assert_eq!(DOUBLE_CALLS.load(Ordering::SeqCst) - before, 1);

    assert_eq!(
        cached.cache_key(&(3,)).unwrap().as_str(),
        "[cached]integration_tests.double|function|[3]|{}"
    );
}

/// Test that wrappers sharing a backend see each other's entries.
#[tokio::test]
async fn test_shared_backend_between_wrappers() {
    let backend: Backend = Arc::new(MemoryBackend::new());
    let writer = memoize(60).backend(backend.clone()).wrap(build_report).unwrap();
    let reader = memoize(60).backend(backend.clone()).wrap(build_report).unwrap();

    let before = REPORT_CALLS.load(Ordering::SeqCst);
    let report = writer.call((1, "eu".to_string())).await.unwrap();
    let again = reader.call((1, "eu".to_string())).await.unwrap();

    assert_eq!(report, again);
    assert_eq!(REPORT_CALLS.load(Ordering::SeqCst) - before, 1);

    reader.invalidate(&(1, "eu".to_string())).await.unwrap();
    writer.call((1, "eu".to_string())).await.unwrap();
    assert_eq!(REPORT_CALLS.load(Ordering::SeqCst) - before, 2);
}

/// Test that keyword arguments are addressed independently of call order.
#[tokio::test]
async fn test_keyword_arguments_address_one_slot() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let cached = memoize(60)
        .wrap_as(
            CallableIdentity::function("reports::query", "search").unwrap(),
            move |query: ReportQuery| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Error>(format!(
                        "{}:{}:{}",
                        query.region, query.limit, query.include_archived
                    ))
                }
            },
        )
        .unwrap();

    let query = || ReportQuery {
        region: "us".to_string(),
        limit: 10,
        include_archived: false,
    };

    assert_eq!(cached.call(query()).await.unwrap(), "us:10:false");
    assert_eq!(cached.call(query()).await.unwrap(), "us:10:false");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert_eq!(
        cached.cache_key(&query()).unwrap().as_str(),
        r#"[cached]reports.query.search|function|["us"]|{"include_archived":false,"limit":10}"#
    );
}

/// Test that long argument renderings still produce valid memcached keys.
#[tokio::test]
async fn test_long_arguments_are_hashed() {
    let cached = memoize(60).wrap(render_region).unwrap();
    let region = "north america ".repeat(40);

    let key = cached.cache_key(&(9, region.clone())).unwrap();
    assert!(key.is_hashed());
    assert!(key.as_str().len() <= 250);
    assert!(!key.as_str().contains(' '));

    let rendered = cached.call((9, region.clone())).await.unwrap();
    assert_eq!(rendered, format!("9/{}", region));
    assert_eq!(cached.call((9, region)).await.unwrap(), rendered);
    assert_eq!(cached.metrics().hits(), 1);
}

/// Test a tighter backend key limit configured at wrap time.
#[tokio::test]
async fn test_custom_key_limit() {
    let config = KeyConfig::default().with_max_key_length(100).with_prefix("rpt:");
    let cached = memoize(60).key_config(config).wrap(render_region).unwrap();

    let key = cached.cache_key(&(1, "x".repeat(200))).unwrap();
    assert!(key.as_str().starts_with("rpt:integration_tests.render_region"));
    assert_eq!(key.as_str().len(), 100);
}

/// Test the TTL-0 builder stores without expiry.
#[tokio::test]
async fn test_zero_ttl_never_expires() {
    let backend = Arc::new(MemoryBackend::new());
    let cached = memoize(0).backend(backend.clone()).wrap(square).unwrap();

    cached.call((50,)).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let key = cached.cache_key(&(50,)).unwrap();
    assert!(backend.get(key.as_str(), None).await.unwrap().is_some());
}
