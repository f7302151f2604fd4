//! HTTP endpoint handlers for the aggregator service.
//!
//! This module provides handlers for all HTTP endpoints:
//! - `/metrics`: node-local collectors plus the service's own telemetry
//! - `/project-metrics`, `/privileged/metrics`: merged upstream document
//! - `/health`: cache and per-source status

pub mod error;
pub mod health;
pub mod metrics;
pub mod upstream;

use axum::{routing::get, Router};

use crate::state::SharedState;

// Re-export handlers
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use upstream::upstream_metrics_handler;

/// Builds the HTTP router.
pub fn router(state: SharedState, enable_health: bool) -> Router {
    let mut app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/project-metrics", get(upstream_metrics_handler))
        .route("/privileged/project-metrics", get(upstream_metrics_handler))
        .route("/privileged/metrics", get(upstream_metrics_handler));

    if enable_health {
        app = app.route("/health", get(health_handler));
    }

    app.with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;
    use admin_metrics_aggregator::exposition::{MetricFamily, MetricType, Sample};
    use admin_metrics_aggregator::{
        Aggregator, AggregatorMetrics, Cache, Collector, Label, Source, SourceError,
    };
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use futures::future::BoxFuture;
    use prometheus::{Gauge, Registry};
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tower::ServiceExt;

    struct Fixed(&'static str, Option<MetricFamily>);

    impl Collector for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        fn collect(&self) -> BoxFuture<'_, Result<Vec<MetricFamily>, SourceError>> {
            Box::pin(async move {
                match &self.1 {
                    Some(family) => Ok(vec![family.clone()]),
                    None => Err(SourceError::TaskFailed("down".into())),
                }
            })
        }
    }

    fn gauge(name: &str, value: f64) -> MetricFamily {
        let mut family = MetricFamily::new(name, MetricType::Gauge).with_help("test gauge");
        family.samples.push(Sample::new(name, value));
        family
    }

    fn make_state(upstream: Option<MetricFamily>) -> SharedState {
        let registry = Registry::new();
        let metrics = AggregatorMetrics::new(&registry).unwrap();
        let scrape_duration = Gauge::new("admin_scrape_duration_seconds", "test").unwrap();
        registry.register(Box::new(scrape_duration.clone())).unwrap();

        let upstream_sources = vec![Source::new(
            Arc::new(Fixed("db", upstream)),
            vec![Label::new("project", "12345")],
            Duration::from_secs(1),
        )];
        let node_sources = vec![Source::new(
            Arc::new(Fixed("node", Some(gauge("supabase_memory_total_bytes", 1024.0)))),
            Vec::new(),
            Duration::from_secs(1),
        )];

        Arc::new(AppState {
            registry,
            scrape_duration,
            upstream: Cache::new(
                Aggregator::new(upstream_sources).with_metrics(metrics.clone()),
                Duration::from_secs(60),
            )
            .with_metrics(metrics),
            node: Aggregator::new(node_sources),
            start_time: Instant::now(),
        })
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_project_metrics_endpoint() {
        let app = router(make_state(Some(gauge("process_max_fds", 1024.0))), true);

        let response = app
            .oneshot(Request::get("/project-metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/plain"
        );
        assert_eq!(
            body_text(response).await,
            "# HELP process_max_fds test gauge\n\
             # TYPE process_max_fds gauge\n\
             process_max_fds{project=\"12345\"} 1024\n"
        );
    }

    #[tokio::test]
    async fn test_privileged_alias_serves_same_document() {
        let state = make_state(Some(gauge("up", 1.0)));
        let first = router(state.clone(), true)
            .oneshot(Request::get("/project-metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let second = router(state, true)
            .oneshot(Request::get("/privileged/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_text(first).await, body_text(second).await);
    }

    #[tokio::test]
    async fn test_failed_source_yields_empty_document() {
        let app = router(make_state(None), true);
        let response = app
            .oneshot(Request::get("/project-metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_metrics_endpoint_includes_node_and_self_metrics() {
        let state = make_state(Some(gauge("up", 1.0)));
        // Populate per-source telemetry first.
        state.upstream.get().await.unwrap();

        let response = router(state, true)
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_text(response).await;
        assert!(body.contains("supabase_memory_total_bytes 1024"));
        assert!(body.contains("admin_upstream_source_up{source=\"db\"} 1"));
        assert!(body.contains("admin_upstream_refresh_total 1"));
    }

    #[tokio::test]
    async fn test_health_before_and_after_first_refresh() {
        let state = make_state(Some(gauge("up", 1.0)));

        let response = router(state.clone(), true)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.upstream.get().await.unwrap();

        let response = router(state, true)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;
        assert!(body.contains("STATUS: OK"));
        assert!(body.contains("db"));
    }

    #[tokio::test]
    async fn test_health_route_can_be_disabled() {
        let response = router(make_state(None), false)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
