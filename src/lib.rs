//! Admin Metrics Aggregator Library
//!
//! This library scrapes several upstream metrics endpoints, attaches
//! per-source static labels to every sample and merges the results into one
//! text exposition document, served through a request-coalescing TTL cache.
//!
//! # Pipeline
//!
//! - **Collectors**: fetch (or produce locally) the current metric families
//! - **Exposition**: parse and re-serialize the text format
//! - **Relabel**: prepend static labels to every sample
//! - **Merge**: concatenate sources in configuration order
//! - **Cache**: single-flight refresh, at most one per TTL window
//!
//! # Usage
//!
//! ```no_run
//! use admin_metrics_aggregator::{Aggregator, Cache, Config};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let aggregator = Aggregator::from_settings(&config.source_settings()?)?;
//! let cache = Cache::new(aggregator, config.refresh_duration()?);
//!
//! let entry = cache.get().await?;
//! println!("{}", entry.document);
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod cache;
pub mod collectors;
pub mod config;
pub mod error;
pub mod exposition;
pub mod merge;
pub mod relabel;
pub mod telemetry;
pub mod tls;

// Re-export main types for convenience
pub use aggregator::{Aggregation, Aggregator, Source, SourceStatus};
pub use cache::{Cache, CacheEntry, Refresh};
pub use collectors::Collector;
pub use config::{Config, SourceSettings};
pub use error::{ConfigError, ParseError, RefreshError, SourceError};
pub use exposition::{Label, MetricFamily, MetricType, Sample};
pub use telemetry::AggregatorMetrics;
