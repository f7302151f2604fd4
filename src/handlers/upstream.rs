//! Merged upstream metrics endpoint.
//!
//! Thin adapter over the cache: no logic beyond content type and error
//! mapping lives here.

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use tracing::{debug, instrument, warn};

use super::error::ApiError;
use crate::state::SharedState;

/// Handler for `/project-metrics` and `/privileged/metrics`.
#[instrument(skip(state))]
pub async fn upstream_metrics_handler(
    State(state): State<SharedState>,
) -> Result<Response, ApiError> {
    let entry = state.upstream.get().await.map_err(|e| {
        warn!(error = %e, "Failed to get upstream metrics");
        ApiError::internal("failed to get upstream metrics")
    })?;

    debug!(
        bytes = entry.document.len(),
        age_ms = entry.age().as_millis() as u64,
        "Serving upstream metrics"
    );

    Ok((
        [(header::CONTENT_TYPE, "text/plain")],
        entry.document.clone(),
    )
        .into_response())
}
