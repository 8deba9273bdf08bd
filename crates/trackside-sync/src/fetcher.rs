//! Fire-and-forget metric fetches.
//!
//! Each call runs on its own task and nothing is correlated or retried.
//! Every call takes a sequence ticket, and a completion is only delivered
//! when no newer call for the same metric has already been delivered, so
//! overlapping refreshes cannot regress what the console shows.

use std::fmt;
use std::sync::{Arc, Mutex};

use trackside_core::analytics::{Period, TimeRange};
use trackside_core::sequence::{SequenceGate, Ticket};

use crate::error::SyncError;
use crate::event::{EventSink, SyncEvent};
use crate::http::MetricsSource;
use crate::lock;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FetchKey {
    Kpis,
    Historical(String),
    Overview,
}

impl fmt::Display for FetchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kpis => f.write_str("kpis"),
            Self::Historical(metric) => write!(f, "historical:{metric}"),
            Self::Overview => f.write_str("overview"),
        }
    }
}

struct Inner<S> {
    source: Arc<S>,
    gate: Mutex<SequenceGate<FetchKey>>,
    events: EventSink,
}

pub struct MetricsFetcher<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for MetricsFetcher<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: MetricsSource> MetricsFetcher<S> {
    pub fn new(source: Arc<S>, events: EventSink) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                gate: Mutex::new(SequenceGate::new()),
                events,
            }),
        }
    }

    pub fn refresh_kpis(&self, range: TimeRange) {
        let ticket = self.issue(FetchKey::Kpis);
        let this = self.clone();
        tokio::spawn(async move {
            let result = this.inner.source.fetch_kpis(range).await;
            this.deliver(ticket, result.map(SyncEvent::Kpis)).await;
        });
    }

    pub fn fetch_historical(&self, metric: &str, period: Period) {
        let ticket = self.issue(FetchKey::Historical(metric.to_string()));
        let this = self.clone();
        let metric = metric.to_string();
        tokio::spawn(async move {
            let result = this.inner.source.fetch_historical(&metric, period).await;
            this.deliver(ticket, result.map(SyncEvent::Historical)).await;
        });
    }

    /// Systems overview; refreshed when signal notifications arrive.
    pub fn refresh_overview(&self) {
        let ticket = self.issue(FetchKey::Overview);
        let this = self.clone();
        tokio::spawn(async move {
            let result = this.inner.source.fetch_overview().await;
            this.deliver(ticket, result.map(SyncEvent::Overview)).await;
        });
    }

    fn issue(&self, key: FetchKey) -> Ticket<FetchKey> {
        lock(&self.inner.gate).issue(key)
    }

    async fn deliver(&self, ticket: Ticket<FetchKey>, result: Result<SyncEvent, SyncError>) {
        // Admission and send happen under one lock so the consumer sees
        // completions in admission order.
        let Ok(permit) = self.inner.events.reserve().await else {
            tracing::debug!("metrics: consumer gone, result dropped");
            return;
        };
        let mut gate = lock(&self.inner.gate);
        if !gate.admit(&ticket) {
            tracing::debug!(key = %ticket.key, seq = ticket.seq, "metrics: stale reply discarded");
            return;
        }
        let event = match result {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(key = %ticket.key, "metrics: fetch failed: {e}");
                SyncEvent::MetricsFailed {
                    key: ticket.key.to_string(),
                    error: e.to_string(),
                }
            }
        };
        permit.send(event);
        drop(gate);
    }
}
