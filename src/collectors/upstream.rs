//! Generic upstream scrape source.
//!
//! Fetches a remote exposition endpoint and parses the body. The HTTP
//! client is built once per source with that source's timeout and TLS
//! verification policy.

use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};

use super::Collector;
use crate::config::SourceSettings;
use crate::error::{ConfigError, SourceError};
use crate::exposition::parser::parse_bytes;
use crate::exposition::MetricFamily;

/// A remote metrics endpoint.
pub struct UpstreamSource {
    name: String,
    url: String,
    timeout: Duration,
    client: Client,
}

impl UpstreamSource {
    pub fn new(settings: &SourceSettings) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .danger_accept_invalid_certs(settings.skip_tls_verify)
            .build()
            .map_err(|source| ConfigError::HttpClient {
                name: settings.name.clone(),
                source,
            })?;

        Ok(Self {
            name: settings.name.clone(),
            url: settings.url.clone(),
            timeout: settings.timeout,
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// GETs the endpoint and returns the raw body of a 200 response.
    #[instrument(skip(self), fields(source = %self.name))]
    pub async fn fetch(&self) -> Result<Vec<u8>, SourceError> {
        let response = self
            .client
            .get(&self.url)
            .header(ACCEPT, "text/plain")
            .send()
            .await
            .map_err(|source| self.request_error(source))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(SourceError::Status {
                url: self.url.clone(),
                status,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| self.request_error(source))?;
        debug!(bytes = body.len(), "Fetched upstream metrics");
        Ok(body.to_vec())
    }

    fn request_error(&self, source: reqwest::Error) -> SourceError {
        if source.is_timeout() {
            SourceError::Timeout(self.timeout)
        } else {
            SourceError::Request {
                url: self.url.clone(),
                source,
            }
        }
    }
}

impl Collector for UpstreamSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn collect(&self) -> BoxFuture<'_, Result<Vec<MetricFamily>, SourceError>> {
        Box::pin(async move {
            let body = self.fetch().await?;
            Ok(parse_bytes(&body)?)
        })
    }
}
