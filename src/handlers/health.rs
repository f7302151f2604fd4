//! Health check endpoint handler.
//!
//! This module provides the `/health` endpoint handler that returns
//! cache state and per-source scrape status as a plain-text table.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use std::fmt::Write as FmtWrite;
use tracing::{debug, instrument};

use crate::state::SharedState;

// Time conversion constants
const SECONDS_PER_HOUR: f64 = 3600.0;
const MINUTES_PER_HOUR: f64 = 60.0;
const HOURS_PER_DAY: f64 = 24.0;

fn format_uptime(uptime_seconds: u64) -> String {
    let uptime_hours = uptime_seconds as f64 / SECONDS_PER_HOUR;
    if uptime_hours < 1.0 {
        format!("{:.1} minutes", uptime_hours * MINUTES_PER_HOUR)
    } else if uptime_hours < HOURS_PER_DAY {
        format!("{:.1} hours", uptime_hours)
    } else {
        format!("{:.1} days", uptime_hours / HOURS_PER_DAY)
    }
}

/// Handler for the /health endpoint.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /health request");

    let entry = state.upstream.peek().await;
    let ttl = state.upstream.ttl();

    // Healthy once a merged document has been produced at least once
    let (status, message) = match &entry {
        Some(e) if e.age() < ttl => (StatusCode::OK, "OK"),
        Some(_) => (StatusCode::OK, "OK - Document expired, refreshed on next request"),
        None => (StatusCode::SERVICE_UNAVAILABLE, "No upstream document produced yet"),
    };

    let mut out = String::new();
    let _ = writeln!(out, "STATUS: {message}");
    let _ = writeln!(
        out,
        "Uptime: {}",
        format_uptime(state.start_time.elapsed().as_secs())
    );
    let _ = writeln!(out, "Refresh duration: {:?}", ttl);
    match &entry {
        Some(e) => {
            let _ = writeln!(
                out,
                "Document: {} bytes, {:.1}s old",
                e.document.len(),
                e.age().as_secs_f64()
            );
        }
        None => {
            let _ = writeln!(out, "Document: none");
        }
    }

    let statuses = state.upstream.refresher().status();
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{:<24} {:>6} {:>9} {:>10}  {}",
        "SOURCE", "UP", "FAMILIES", "DURATION", "LAST SUCCESS / ERROR"
    );
    for s in &statuses {
        let detail = match (&s.last_error, &s.last_success) {
            (Some(err), _) => err.clone(),
            (None, Some(ts)) => ts.to_rfc3339(),
            (None, None) => "never scraped".to_string(),
        };
        let _ = writeln!(
            out,
            "{:<24} {:>6} {:>9} {:>9.3}s  {}",
            s.name,
            if s.up { "yes" } else { "no" },
            s.families,
            s.duration_seconds,
            detail
        );
    }

    (status, out)
}
