//! Single-slot TTL cache with request coalescing.
//!
//! The cache holds at most one [`CacheEntry`]. Once the entry is older than
//! the TTL, the next caller starts a refresh in a detached task and every
//! caller, that one included, awaits the same shared outcome
//! (block-until-fresh). A caller going away does not cancel the refresh.
//! Entries are shared as `Arc` and replaced wholesale, so readers never see
//! a partially built document.

use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::error::RefreshError;
use crate::telemetry::AggregatorMetrics;

/// Produces a fresh document for the cache.
pub trait Refresh: Send + Sync {
    fn refresh(&self) -> BoxFuture<'_, Result<String, RefreshError>>;
}

impl<T: Refresh + ?Sized> Refresh for Arc<T> {
    fn refresh(&self) -> BoxFuture<'_, Result<String, RefreshError>> {
        (**self).refresh()
    }
}

/// An immutable cached document.
#[derive(Debug)]
pub struct CacheEntry {
    pub document: String,
    pub produced_at: Instant,
}

impl CacheEntry {
    pub fn age(&self) -> Duration {
        self.produced_at.elapsed()
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.age() < ttl
    }
}

type RefreshOutcome = Result<Arc<CacheEntry>, RefreshError>;
type InFlight = Shared<BoxFuture<'static, RefreshOutcome>>;

/// State shared with the detached refresh task.
struct Inner<R> {
    refresher: R,
    ttl: Duration,
    entry: RwLock<Option<Arc<CacheEntry>>>,
    /// The refresh currently running, if any. At most one exists at a time.
    in_flight: Mutex<Option<InFlight>>,
    metrics: Option<AggregatorMetrics>,
}

pub struct Cache<R> {
    inner: Arc<Inner<R>>,
}

impl<R: Refresh + 'static> Cache<R> {
    pub fn new(refresher: R, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                refresher,
                ttl,
                entry: RwLock::new(None),
                in_flight: Mutex::new(None),
                metrics: None,
            }),
        }
    }

    /// Records refresh and hit/miss telemetry. Call before the first `get`.
    pub fn with_metrics(mut self, metrics: AggregatorMetrics) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.metrics = Some(metrics);
        }
        self
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    pub fn refresher(&self) -> &R {
        &self.inner.refresher
    }

    /// The current entry, fresh or not, without triggering a refresh.
    pub async fn peek(&self) -> Option<Arc<CacheEntry>> {
        self.inner.entry.read().await.clone()
    }

    /// Returns the cached document, refreshing it first when it is missing
    /// or expired.
    ///
    /// If the refresh fails, the previous entry is served when there is one;
    /// otherwise the error is returned. Every caller waiting on the same
    /// refresh receives the same outcome.
    #[instrument(skip(self))]
    pub async fn get(&self) -> Result<Arc<CacheEntry>, RefreshError> {
        if let Some(entry) = self.inner.fresh_entry().await {
            self.inner.record_hit(&entry);
            return Ok(entry);
        }
        if let Some(metrics) = &self.inner.metrics {
            metrics.cache_misses_total.inc();
        }

        let flight = {
            let mut in_flight = self.inner.in_flight.lock().await;

            // A refresh may have completed between the first check and the lock.
            if let Some(entry) = self.inner.fresh_entry().await {
                debug!("Serving document refreshed by a concurrent request");
                self.inner.record_hit(&entry);
                return Ok(entry);
            }

            match in_flight.as_ref() {
                Some(flight) => {
                    debug!("Joining refresh already in flight");
                    flight.clone()
                }
                None => {
                    let flight = self.inner.start_refresh();
                    *in_flight = Some(flight.clone());
                    flight
                }
            }
        };

        flight.await
    }
}

impl<R: Refresh + 'static> Inner<R> {
    /// Spawns the refresh so that it runs to completion even when every
    /// caller waiting on it is dropped.
    fn start_refresh(self: &Arc<Self>) -> InFlight {
        let inner = Arc::clone(self);
        let task = tokio::spawn(async move {
            let outcome = inner.refresh_and_install().await;
            *inner.in_flight.lock().await = None;
            outcome
        });

        async move {
            task.await
                .unwrap_or_else(|e| Err(RefreshError::Failed(e.to_string())))
        }
        .boxed()
        .shared()
    }

    async fn refresh_and_install(&self) -> RefreshOutcome {
        debug!("Refreshing cached document");
        let start = Instant::now();
        let result = self.refresher.refresh().await;
        let elapsed = start.elapsed();

        match result {
            Ok(document) => {
                let entry = Arc::new(CacheEntry {
                    document,
                    produced_at: Instant::now(),
                });
                *self.entry.write().await = Some(Arc::clone(&entry));

                if let Some(metrics) = &self.metrics {
                    metrics.refresh_total.inc();
                    metrics
                        .refresh_duration_seconds
                        .set(elapsed.as_secs_f64());
                    metrics.cache_age_seconds.set(0.0);
                }
                debug!(
                    bytes = entry.document.len(),
                    elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                    "Installed refreshed document"
                );
                Ok(entry)
            }
            Err(e) => match self.entry.read().await.clone() {
                Some(stale) => {
                    warn!(error = %e, "Refresh failed, serving previous document");
                    Ok(stale)
                }
                None => {
                    warn!(error = %e, "Refresh failed and no previous document exists");
                    Err(e)
                }
            },
        }
    }

    async fn fresh_entry(&self) -> Option<Arc<CacheEntry>> {
        self.entry
            .read()
            .await
            .as_ref()
            .filter(|e| e.is_fresh(self.ttl))
            .cloned()
    }

    fn record_hit(&self, entry: &CacheEntry) {
        if let Some(metrics) = &self.metrics {
            metrics.cache_hits_total.inc();
            metrics.cache_age_seconds.set(entry.age().as_secs_f64());
        }
    }
}
