//! Fan-out/fan-in aggregation across all configured sources.
//!
//! Each refresh spawns one task per source, bounded by that source's own
//! timeout, and joins them in configuration order. A failed source is
//! logged and contributes an empty snapshot; it never blocks its siblings.

use std::sync::{Arc, RwLock as StdRwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::{join_all, BoxFuture};
use tracing::{debug, info, instrument, warn};

use crate::cache::Refresh;
use crate::collectors::{Collector, HttpProbe, MeminfoCollector, UpstreamSource};
use crate::config::{
    CollectorKind, Config, SourceSettings, DEFAULT_GOTRUE_HEALTH_ENDPOINT,
    DEFAULT_POSTGREST_ENDPOINT,
};
use crate::error::{ConfigError, RefreshError, SourceError};
use crate::exposition::{Label, MetricFamily};
use crate::merge::merge;
use crate::relabel::relabel;
use crate::telemetry::AggregatorMetrics;

/// Upper bound for one node-local collector.
const NODE_COLLECTOR_TIMEOUT: Duration = Duration::from_secs(1);

/// A collector together with its static labels and timeout.
pub struct Source {
    collector: Arc<dyn Collector>,
    static_labels: Vec<Label>,
    timeout: Duration,
}

impl Source {
    pub fn new(collector: Arc<dyn Collector>, static_labels: Vec<Label>, timeout: Duration) -> Self {
        Self {
            collector,
            static_labels,
            timeout,
        }
    }

    /// Builds a scrape source from validated settings.
    pub fn upstream(settings: &SourceSettings) -> Result<Self, ConfigError> {
        let collector = UpstreamSource::new(settings)?;
        Ok(Self::new(
            Arc::new(collector),
            settings.labels.clone(),
            settings.timeout,
        ))
    }

    pub fn name(&self) -> &str {
        self.collector.name()
    }

    pub fn static_labels(&self) -> &[Label] {
        &self.static_labels
    }
}

/// Last known state of one source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceStatus {
    pub name: String,
    pub up: bool,
    pub families: usize,
    pub duration_seconds: f64,
    pub last_error: Option<String>,
    pub last_success: Option<DateTime<Utc>>,
}

impl SourceStatus {
    fn pending(name: &str) -> Self {
        Self {
            name: name.to_string(),
            up: false,
            families: 0,
            duration_seconds: 0.0,
            last_error: None,
            last_success: None,
        }
    }
}

/// Result of one aggregation round.
#[derive(Debug, Clone)]
pub struct Aggregation {
    /// Relabeled families per source, in configuration order.
    pub snapshots: Vec<Vec<MetricFamily>>,
    pub document: String,
}

/// Aggregates an ordered list of sources into one exposition document.
pub struct Aggregator {
    sources: Vec<Source>,
    status: StdRwLock<Vec<SourceStatus>>,
    metrics: Option<AggregatorMetrics>,
}

impl Aggregator {
    pub fn new(sources: Vec<Source>) -> Self {
        let status = sources
            .iter()
            .map(|s| SourceStatus::pending(s.name()))
            .collect();
        Self {
            sources,
            status: StdRwLock::new(status),
            metrics: None,
        }
    }

    /// Builds an aggregator over upstream scrape sources.
    pub fn from_settings(settings: &[SourceSettings]) -> Result<Self, ConfigError> {
        let sources = settings
            .iter()
            .map(|s| {
                info!(
                    source = %s.name,
                    url = %s.url,
                    labels = s.labels.len(),
                    skip_tls_verify = s.skip_tls_verify,
                    timeout_ms = s.timeout.as_millis() as u64,
                    "Creating upstream metrics source"
                );
                Source::upstream(s)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(sources))
    }

    /// Builds an aggregator over the node-local collectors enabled in `config`.
    pub fn for_node(config: &Config) -> Result<Self, ConfigError> {
        let sources = config
            .collector_kinds()?
            .into_iter()
            .map(|kind| {
                let collector: Arc<dyn Collector> = match kind {
                    CollectorKind::Meminfo => Arc::new(MeminfoCollector::new()),
                    CollectorKind::Gotrue => Arc::new(HttpProbe::gotrue(
                        config
                            .gotrue_health_endpoint
                            .as_deref()
                            .unwrap_or(DEFAULT_GOTRUE_HEALTH_ENDPOINT),
                    )?),
                    CollectorKind::Postgrest => Arc::new(HttpProbe::postgrest(
                        config
                            .postgrest_endpoint
                            .as_deref()
                            .unwrap_or(DEFAULT_POSTGREST_ENDPOINT),
                    )?),
                };
                debug!(collector = collector.name(), "Enabled node collector");
                Ok(Source::new(collector, Vec::new(), NODE_COLLECTOR_TIMEOUT))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Self::new(sources))
    }

    /// Records per-source outcomes into `metrics` from now on.
    pub fn with_metrics(mut self, metrics: AggregatorMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Snapshot of the per-source status after the latest round.
    pub fn status(&self) -> Vec<SourceStatus> {
        self.status
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Runs every collector concurrently and returns the relabeled
    /// snapshots in configuration order, regardless of completion order.
    #[instrument(skip(self), fields(sources = self.sources.len()))]
    pub async fn collect_all(&self) -> Vec<Vec<MetricFamily>> {
        let handles: Vec<_> = self
            .sources
            .iter()
            .map(|source| {
                let collector = Arc::clone(&source.collector);
                let timeout = source.timeout;
                tokio::spawn(async move {
                    let start = Instant::now();
                    let result = match tokio::time::timeout(timeout, collector.collect()).await {
                        Ok(result) => result,
                        Err(_) => Err(SourceError::Timeout(timeout)),
                    };
                    (result, start.elapsed())
                })
            })
            .collect();

        let joined = join_all(handles).await;

        let mut snapshots = Vec::with_capacity(self.sources.len());
        let mut statuses = Vec::with_capacity(self.sources.len());
        let previous = self.status();

        for (idx, (source, outcome)) in self.sources.iter().zip(joined).enumerate() {
            let (result, elapsed) = match outcome {
                Ok(pair) => pair,
                Err(e) => (Err(SourceError::TaskFailed(e.to_string())), Duration::ZERO),
            };
            let name = source.name();
            let mut status = previous
                .get(idx)
                .cloned()
                .unwrap_or_else(|| SourceStatus::pending(name));
            status.duration_seconds = elapsed.as_secs_f64();

            let families = match result {
                Ok(families) => {
                    debug!(
                        source = %name,
                        families = families.len(),
                        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                        "Collected source"
                    );
                    status.up = true;
                    status.families = families.len();
                    status.last_error = None;
                    status.last_success = Some(Utc::now());
                    relabel(families, &source.static_labels)
                }
                Err(e) => {
                    if e.is_unavailable() {
                        warn!(source = %name, error = %e, "Failed to fetch upstream source");
                    } else {
                        warn!(source = %name, error = %e, "Failed to parse upstream metrics");
                    }
                    status.up = false;
                    status.families = 0;
                    status.last_error = Some(e.to_string());
                    Vec::new()
                }
            };

            if let Some(metrics) = &self.metrics {
                metrics.record_source(name, status.up, status.duration_seconds);
            }
            statuses.push(status);
            snapshots.push(families);
        }

        if let Ok(mut guard) = self.status.write() {
            *guard = statuses;
        }
        snapshots
    }

    /// Collects all sources and renders the merged document.
    pub async fn aggregate(&self) -> Aggregation {
        let snapshots = self.collect_all().await;
        let document = merge(snapshots.iter().map(Vec::as_slice));
        Aggregation {
            snapshots,
            document,
        }
    }
}

impl Refresh for Aggregator {
    fn refresh(&self) -> BoxFuture<'_, Result<String, RefreshError>> {
        Box::pin(async move { Ok(self.aggregate().await.document) })
    }
}
