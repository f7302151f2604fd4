//! Collectors producing metric families for the aggregator.
//!
//! Every kind of source sits behind the same [`Collector`] trait:
//! - `upstream`: scrapes a remote exposition endpoint
//! - `meminfo`: node-local memory gauges from /proc/meminfo
//! - `probe`: single `<service>_up` gauge from an HTTP health check

pub mod meminfo;
pub mod probe;
pub mod upstream;

use futures::future::BoxFuture;

use crate::error::SourceError;
use crate::exposition::MetricFamily;

pub use meminfo::MeminfoCollector;
pub use probe::HttpProbe;
pub use upstream::UpstreamSource;

/// Something that can produce the current set of metric families.
pub trait Collector: Send + Sync {
    /// Name used in logs and in per-source telemetry.
    fn name(&self) -> &str;

    /// Produces the current families. Errors are isolated to this collector.
    fn collect(&self) -> BoxFuture<'_, Result<Vec<MetricFamily>, SourceError>>;
}
