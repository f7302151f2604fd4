//! Node-local metrics endpoint.
//!
//! Serves the node collectors (evaluated fresh on every request, through
//! the same aggregation path as upstream sources) followed by the service's
//! own telemetry registry.

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use prometheus::{Encoder, TextEncoder};
use std::time::Instant;
use tracing::{debug, error, instrument};

use super::error::ApiError;
use crate::state::SharedState;

/// Buffer capacity for metrics encoding.
const BUFFER_CAP: usize = 64 * 1024;

/// Handler for the /metrics endpoint.
#[instrument(skip(state))]
pub async fn metrics_handler(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let start = Instant::now();
    debug!("Processing /metrics request");

    let node = state.node.aggregate().await;

    let families = state.registry.gather();
    let mut buffer = Vec::with_capacity(BUFFER_CAP);
    buffer.extend_from_slice(node.document.as_bytes());

    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        error!("Failed to encode Prometheus metrics: {}", e);
        return Err(ApiError::internal("failed to encode metrics"));
    }

    state.scrape_duration.set(start.elapsed().as_secs_f64());

    debug!(
        "Metrics request completed: {} bytes, {:.3}ms",
        buffer.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    let body = String::from_utf8(buffer)
        .map_err(|_| ApiError::internal("metrics encoding produced invalid UTF-8"))?;
    Ok(([(header::CONTENT_TYPE, encoder.format_type().to_string())], body).into_response())
}
