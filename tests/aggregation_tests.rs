//! Integration tests for scraping, relabeling, merging and caching against
//! real HTTP upstreams bound to 127.0.0.1.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use admin_metrics_aggregator::config::SourceSettings;
use admin_metrics_aggregator::{Aggregator, Cache, Label};
use axum::http::StatusCode;
use axum::{routing::get, Router};
use futures::future::join_all;
use tokio::net::TcpListener;

const PROCESS_MAX_FDS: &str = "# HELP process_max_fds Maximum number of open file descriptors.\n\
# TYPE process_max_fds gauge\n\
process_max_fds{old_label=\"old value\"} 1024\n";

/// A local upstream endpoint that counts how often it was scraped.
struct Upstream {
    url: String,
    hits: Arc<AtomicUsize>,
}

impl Upstream {
    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn spawn_upstream(status: StatusCode, body: &'static str, delay: Duration) -> Upstream {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                (status, body)
            }
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Upstream {
        url: format!("http://{addr}/metrics"),
        hits,
    }
}

fn settings(name: &str, url: &str, labels: &[(&str, &str)], timeout: Duration) -> SourceSettings {
    SourceSettings {
        name: name.to_string(),
        url: url.to_string(),
        labels: labels.iter().map(|(n, v)| Label::new(*n, *v)).collect(),
        skip_tls_verify: false,
        timeout,
    }
}

#[tokio::test]
async fn test_single_source_is_relabeled() {
    let db = spawn_upstream(StatusCode::OK, PROCESS_MAX_FDS, Duration::ZERO).await;
    let aggregator = Aggregator::from_settings(&[settings(
        "db",
        &db.url,
        &[("project", "8783"), ("Name", "prod-1-abcdef")],
        Duration::from_secs(5),
    )])
    .unwrap();

    let aggregation = aggregator.aggregate().await;
    assert_eq!(
        aggregation.document,
        "# HELP process_max_fds Maximum number of open file descriptors.\n\
         # TYPE process_max_fds gauge\n\
         process_max_fds{project=\"8783\",Name=\"prod-1-abcdef\",old_label=\"old value\"} 1024\n"
    );
    assert_eq!(db.hits(), 1);
}

#[tokio::test]
async fn test_two_sources_merge_without_label_leakage() {
    let first = spawn_upstream(StatusCode::OK, "process_max_fds{k=\"v\"} 1024\n", Duration::ZERO).await;
    let second = spawn_upstream(
        StatusCode::OK,
        "node_memory_Mapped_bytes 2.45776384e+08\n",
        Duration::ZERO,
    )
    .await;

    let aggregator = Aggregator::from_settings(&[
        settings(
            "db",
            &first.url,
            &[("project", "12345"), ("Name", "prod-db-ref")],
            Duration::from_secs(5),
        ),
        settings(
            "node",
            &second.url,
            &[("project", "12345"), ("Name", "prod-1-ref")],
            Duration::from_secs(5),
        ),
    ])
    .unwrap();

    let document = aggregator.aggregate().await.document;
    let lines: Vec<&str> = document.lines().filter(|l| !l.starts_with('#')).collect();
    assert_eq!(
        lines,
        vec![
            "process_max_fds{project=\"12345\",Name=\"prod-db-ref\",k=\"v\"} 1024",
            "node_memory_Mapped_bytes{project=\"12345\",Name=\"prod-1-ref\"} 2.45776384e+08",
        ]
    );
}

#[tokio::test]
async fn test_failing_sources_are_isolated() {
    let healthy = spawn_upstream(StatusCode::OK, "up 1\n", Duration::ZERO).await;
    let broken = spawn_upstream(StatusCode::INTERNAL_SERVER_ERROR, "oops", Duration::ZERO).await;
    let garbage = spawn_upstream(StatusCode::OK, "this is { not metrics\n", Duration::ZERO).await;
    let slow = spawn_upstream(StatusCode::OK, "slow 1\n", Duration::from_secs(5)).await;

    let aggregator = Aggregator::from_settings(&[
        settings("broken", &broken.url, &[], Duration::from_secs(5)),
        settings("healthy", &healthy.url, &[("source", "ok")], Duration::from_secs(5)),
        settings("garbage", &garbage.url, &[], Duration::from_secs(5)),
        settings("slow", &slow.url, &[], Duration::from_millis(200)),
    ])
    .unwrap();

    let started = std::time::Instant::now();
    let aggregation = aggregator.aggregate().await;
    assert!(started.elapsed() < Duration::from_secs(3));

    assert_eq!(
        aggregation.document,
        "# TYPE up untyped\nup{source=\"ok\"} 1\n"
    );
    assert!(aggregation.snapshots[0].is_empty());
    assert!(aggregation.snapshots[2].is_empty());
    assert!(aggregation.snapshots[3].is_empty());

    let status = aggregator.status();
    let up: Vec<bool> = status.iter().map(|s| s.up).collect();
    assert_eq!(up, vec![false, true, false, false]);
    assert!(status[0].last_error.as_deref().unwrap().contains("500"));
    assert!(status[1].last_success.is_some());
}

#[tokio::test]
async fn test_configuration_order_wins_over_completion_order() {
    let slowest = spawn_upstream(StatusCode::OK, "first 1\n", Duration::from_millis(300)).await;
    let fast = spawn_upstream(StatusCode::OK, "second 2\n", Duration::ZERO).await;
    let medium = spawn_upstream(StatusCode::OK, "third 3\n", Duration::from_millis(100)).await;

    let aggregator = Aggregator::from_settings(&[
        settings("a", &slowest.url, &[], Duration::from_secs(5)),
        settings("b", &fast.url, &[], Duration::from_secs(5)),
        settings("c", &medium.url, &[], Duration::from_secs(5)),
    ])
    .unwrap();

    let document = aggregator.aggregate().await.document;
    let samples: Vec<&str> = document.lines().filter(|l| !l.starts_with('#')).collect();
    assert_eq!(samples, vec!["first 1", "second 2", "third 3"]);
}

#[tokio::test]
async fn test_concurrent_gets_scrape_each_source_once() {
    let a = spawn_upstream(StatusCode::OK, "a 1\n", Duration::from_millis(100)).await;
    let b = spawn_upstream(StatusCode::OK, "b 2\n", Duration::from_millis(50)).await;

    let aggregator = Aggregator::from_settings(&[
        settings("a", &a.url, &[], Duration::from_secs(5)),
        settings("b", &b.url, &[], Duration::from_secs(5)),
    ])
    .unwrap();
    let cache = Arc::new(Cache::new(aggregator, Duration::from_secs(60)));

    let callers = (0..32).map(|_| {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.get().await.unwrap() })
    });
    let entries: Vec<_> = join_all(callers)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(a.hits(), 1);
    assert_eq!(b.hits(), 1);
    for entry in &entries {
        assert!(Arc::ptr_eq(entry, &entries[0]));
    }
    assert_eq!(entries[0].document, "# TYPE a untyped\na 1\n# TYPE b untyped\nb 2\n");
}

#[tokio::test]
async fn test_expired_entry_is_refreshed_once_for_many_callers() {
    let upstream = spawn_upstream(StatusCode::OK, "value 1\n", Duration::from_millis(50)).await;
    let aggregator = Aggregator::from_settings(&[settings(
        "only",
        &upstream.url,
        &[],
        Duration::from_secs(5),
    )])
    .unwrap();
    let cache = Arc::new(Cache::new(aggregator, Duration::from_millis(200)));

    let first = cache.get().await.unwrap();
    assert_eq!(upstream.hits(), 1);

    // Still within the TTL
    let again = cache.get().await.unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(upstream.hits(), 1);

    tokio::time::sleep(Duration::from_millis(300)).await;

    let callers = (0..16).map(|_| {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.get().await.unwrap() })
    });
    let refreshed: Vec<_> = join_all(callers)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(upstream.hits(), 2);
    for entry in &refreshed {
        assert!(!Arc::ptr_eq(entry, &first));
        assert!(Arc::ptr_eq(entry, &refreshed[0]));
    }
}

#[tokio::test]
async fn test_disconnected_caller_does_not_trigger_second_scrape() {
    let upstream = spawn_upstream(StatusCode::OK, "value 1\n", Duration::from_millis(400)).await;
    let aggregator = Aggregator::from_settings(&[settings(
        "only",
        &upstream.url,
        &[],
        Duration::from_secs(5),
    )])
    .unwrap();
    let cache = Arc::new(Cache::new(aggregator, Duration::from_secs(60)));

    let first = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.get().await.map(|e| e.document.clone()) })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.get().await.map(|e| e.document.clone()) })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    first.abort();

    assert_eq!(second.await.unwrap().unwrap(), "# TYPE value untyped\nvalue 1\n");
    assert_eq!(upstream.hits(), 1);
}
