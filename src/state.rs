//! Application state management for the aggregator service.
//!
//! This module defines the shared application state that is passed
//! to HTTP handlers via axum's `State` extractor.

use admin_metrics_aggregator::{Aggregator, Cache};
use prometheus::{Gauge, Registry};
use std::sync::Arc;
use std::time::Instant;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Application state shared across requests.
pub struct AppState {
    /// Registry for the service's own telemetry.
    pub registry: Registry,
    pub scrape_duration: Gauge,
    /// Merged upstream document, refreshed at most once per TTL window.
    pub upstream: Cache<Aggregator>,
    /// Node-local collectors, evaluated on every `/metrics` request.
    pub node: Aggregator,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}
