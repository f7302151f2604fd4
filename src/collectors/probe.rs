//! Single-gauge HTTP health probes.
//!
//! A probe never fails: an unreachable or unhealthy service is reported
//! as `<service>_up 0`.

use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use tracing::debug;

use super::Collector;
use crate::error::{ConfigError, SourceError};
use crate::exposition::MetricFamily;

/// Timeout used by the built-in service probes.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(500);

pub struct HttpProbe {
    metric: String,
    help: String,
    url: String,
    method: Method,
    client: Client,
}

impl HttpProbe {
    pub fn new(
        metric: impl Into<String>,
        help: impl Into<String>,
        url: impl Into<String>,
        method: Method,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let metric = metric.into();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| ConfigError::HttpClient {
                name: metric.clone(),
                source,
            })?;

        Ok(Self {
            metric,
            help: help.into(),
            url: url.into(),
            method,
            client,
        })
    }

    /// Auth service probe: GET on its health endpoint.
    pub fn gotrue(url: impl Into<String>) -> Result<Self, ConfigError> {
        Self::new("gotrue_up", "GoTrue status", url, Method::GET, PROBE_TIMEOUT)
    }

    /// REST layer probe: HEAD on its root endpoint.
    pub fn postgrest(url: impl Into<String>) -> Result<Self, ConfigError> {
        Self::new("postgrest_up", "PostgREST status", url, Method::HEAD, PROBE_TIMEOUT)
    }

    async fn is_up(&self) -> bool {
        match self
            .client
            .request(self.method.clone(), &self.url)
            .send()
            .await
        {
            Ok(response) => response.status() == StatusCode::OK,
            Err(e) => {
                debug!(probe = %self.metric, error = %e, "Probe request failed");
                false
            }
        }
    }
}

impl Collector for HttpProbe {
    fn name(&self) -> &str {
        &self.metric
    }

    fn collect(&self) -> BoxFuture<'_, Result<Vec<MetricFamily>, SourceError>> {
        Box::pin(async move {
            let value = if self.is_up().await { 1.0 } else { 0.0 };
            Ok(vec![MetricFamily::single_gauge(
                self.metric.clone(),
                self.help.clone(),
                value,
            )])
        })
    }
}
