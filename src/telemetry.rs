//! Internal telemetry for the aggregator itself.
//!
//! These metrics live in a prometheus registry served on `/metrics`, next
//! to the node collectors. They are never mixed into the merged upstream
//! document.

use prometheus::{Counter, Gauge, GaugeVec, Opts, Registry};

/// Collection of self-monitoring metrics.
#[derive(Clone)]
pub struct AggregatorMetrics {
    pub source_up: GaugeVec,                     // labels: source
    pub source_last_success_timestamp: GaugeVec, // labels: source
    pub source_fetch_duration_seconds: GaugeVec, // labels: source
    pub refresh_total: Counter,
    pub refresh_duration_seconds: Gauge,
    pub cache_hits_total: Counter,
    pub cache_misses_total: Counter,
    pub cache_age_seconds: Gauge,
}

impl AggregatorMetrics {
    /// Creates all metrics and registers them with `registry`.
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let source_up = GaugeVec::new(
            Opts::new(
                "admin_upstream_source_up",
                "Whether the last scrape of the upstream source succeeded (1) or failed (0)",
            ),
            &["source"],
        )?;
        let source_last_success_timestamp = GaugeVec::new(
            Opts::new(
                "admin_upstream_source_last_success_timestamp_seconds",
                "Unix time of the last successful scrape of the upstream source",
            ),
            &["source"],
        )?;
        let source_fetch_duration_seconds = GaugeVec::new(
            Opts::new(
                "admin_upstream_source_fetch_duration_seconds",
                "Duration of the last scrape of the upstream source",
            ),
            &["source"],
        )?;
        let refresh_total = Counter::new(
            "admin_upstream_refresh_total",
            "Number of completed upstream refresh rounds",
        )?;
        let refresh_duration_seconds = Gauge::new(
            "admin_upstream_refresh_duration_seconds",
            "Duration of the last upstream refresh round",
        )?;
        let cache_hits_total = Counter::new(
            "admin_upstream_cache_hits_total",
            "Requests served from a fresh cached document",
        )?;
        let cache_misses_total = Counter::new(
            "admin_upstream_cache_misses_total",
            "Requests that found the cached document missing or expired",
        )?;
        let cache_age_seconds = Gauge::new(
            "admin_upstream_cache_age_seconds",
            "Age of the document returned by the most recent request",
        )?;

        registry.register(Box::new(source_up.clone()))?;
        registry.register(Box::new(source_last_success_timestamp.clone()))?;
        registry.register(Box::new(source_fetch_duration_seconds.clone()))?;
        registry.register(Box::new(refresh_total.clone()))?;
        registry.register(Box::new(refresh_duration_seconds.clone()))?;
        registry.register(Box::new(cache_hits_total.clone()))?;
        registry.register(Box::new(cache_misses_total.clone()))?;
        registry.register(Box::new(cache_age_seconds.clone()))?;

        Ok(Self {
            source_up,
            source_last_success_timestamp,
            source_fetch_duration_seconds,
            refresh_total,
            refresh_duration_seconds,
            cache_hits_total,
            cache_misses_total,
            cache_age_seconds,
        })
    }

    /// Records the outcome of one source scrape.
    pub fn record_source(&self, source: &str, success: bool, duration_seconds: f64) {
        self.source_up
            .with_label_values(&[source])
            .set(if success { 1.0 } else { 0.0 });
        self.source_fetch_duration_seconds
            .with_label_values(&[source])
            .set(duration_seconds);
        if success {
            self.source_last_success_timestamp
                .with_label_values(&[source])
                .set(chrono::Utc::now().timestamp() as f64);
        }
    }
}
