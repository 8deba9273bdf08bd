//! Audit log tailer: bounded backfill plus a persistent SSE tail.
//!
//! Both sources feed one [`StreamCursor`] behind a mutex, so the feed is
//! deduplicated no matter which source reports an item first. The stream
//! worker reconnects forever with a fixed delay until [`AuditTailer::stop`];
//! each reconnect first backfills from the cursor to cover the gap.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use trackside_core::audit::{AUDIT_EVENT, AuditItem, DEFAULT_BACKFILL_LIMIT, clamp_limit};
use trackside_core::cursor::{Admission, StreamCursor};
use trackside_core::sse::{SseDecoder, SseEvent};

use crate::error::SyncError;
use crate::event::{EventSink, StreamStatus, SyncEvent};
use crate::http::AuditSource;
use crate::lock;

#[derive(Debug, Clone)]
pub struct TailerConfig {
    pub reconnect_delay: Duration,
    /// No bytes (heartbeats included) for this long counts as a dead stream.
    pub idle_timeout: Duration,
    /// Page size for the backfill run on every reconnect.
    pub gap_limit: u32,
}

impl Default for TailerConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(60),
            gap_limit: DEFAULT_BACKFILL_LIMIT,
        }
    }
}

struct StreamWorker {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

struct Inner<S> {
    source: Arc<S>,
    cursor: Mutex<StreamCursor>,
    events: EventSink,
    config: TailerConfig,
    worker: Mutex<Option<StreamWorker>>,
}

pub struct AuditTailer<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for AuditTailer<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: AuditSource> AuditTailer<S> {
    pub fn new(source: Arc<S>, config: TailerConfig, events: EventSink) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                cursor: Mutex::new(StreamCursor::new()),
                events,
                config,
                worker: Mutex::new(None),
            }),
        }
    }

    /// Highest delivered id.
    pub fn cursor(&self) -> u64 {
        lock(&self.inner.cursor).position()
    }

    pub fn is_streaming(&self) -> bool {
        lock(&self.inner.worker)
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    /// Raise the cursor to `since_id`, backfill up to `limit` items above
    /// it, and make sure the stream worker is running.
    pub fn start(&self, since_id: u64, limit: u32) {
        let since = {
            let mut cursor = lock(&self.inner.cursor);
            cursor.raise_to(since_id);
            cursor.position()
        };
        let this = self.clone();
        tokio::spawn(async move { this.backfill(since, limit).await });
        self.ensure_stream_worker();
    }

    /// Stop the stream worker and drop its connection. Returns the worker
    /// handle so callers can wait for it to finish.
    pub fn stop(&self) -> Option<JoinHandle<()>> {
        let worker = lock(&self.inner.worker).take()?;
        worker.cancel.cancel();
        tracing::info!("audit: tailer stopping");
        Some(worker.handle)
    }

    fn ensure_stream_worker(&self) {
        let mut worker = lock(&self.inner.worker);
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            return;
        }
        let cancel = CancellationToken::new();
        let this = self.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { this.stream_loop(token).await });
        *worker = Some(StreamWorker { handle, cancel });
    }

    async fn backfill(&self, since: u64, limit: u32) {
        let limit = clamp_limit(limit);
        match self.inner.source.fetch_audit_since(since, limit).await {
            Ok(items) => {
                let mut fresh: Vec<AuditItem> = {
                    let mut cursor = lock(&self.inner.cursor);
                    items
                        .into_iter()
                        .filter(|item| cursor.admit(item.id) != Admission::Duplicate)
                        .collect()
                };
                if fresh.is_empty() {
                    tracing::trace!(since, "audit: backfill found nothing new");
                    return;
                }
                fresh.sort_by_key(|item| item.id);
                tracing::debug!(since, count = fresh.len(), cursor = self.cursor(), "audit: backfill");
                self.emit(SyncEvent::AuditBatch(fresh)).await;
            }
            Err(e) => {
                tracing::warn!(since, "audit: backfill failed: {e}");
                self.emit(SyncEvent::AuditError(format!("backfill failed: {e}")))
                    .await;
            }
        }
    }

    async fn stream_loop(&self, cancel: CancellationToken) {
        let mut reconnecting = false;
        loop {
            if reconnecting {
                let since = self.cursor();
                self.backfill(since, self.inner.config.gap_limit).await;
            }

            let result = self.follow_stream(&cancel).await;
            self.emit(SyncEvent::AuditStream(StreamStatus::Disconnected))
                .await;
            match result {
                Ok(()) => tracing::info!("audit: stream ended"),
                Err(e) => {
                    tracing::warn!("audit: stream error: {e}");
                    self.emit(SyncEvent::AuditError(format!("stream error: {e}")))
                        .await;
                }
            }

            if cancel.is_cancelled() {
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.inner.config.reconnect_delay) => {
                    tracing::debug!(cursor = self.cursor(), "audit: reconnecting");
                }
            }
            reconnecting = true;
        }
        tracing::debug!("audit: stream worker stopped");
    }

    /// One connection: runs until the body ends, errors, idles out, or
    /// `cancel` fires. Dropping the body closes the connection.
    async fn follow_stream(&self, cancel: &CancellationToken) -> Result<(), SyncError> {
        let idle = self.inner.config.idle_timeout;
        let opened = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            opened = tokio::time::timeout(idle, self.inner.source.open_audit_stream()) => opened,
        };
        let mut body = opened.map_err(|_| SyncError::Timeout("audit stream connect"))??;
        tracing::info!("audit: stream connected");
        self.emit(SyncEvent::AuditStream(StreamStatus::Connected))
            .await;

        let mut decoder = SseDecoder::new();
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                next = tokio::time::timeout(idle, body.next()) => next,
            };
            match next {
                Err(_) => return Err(SyncError::Timeout("audit stream idle")),
                Ok(None) => return Ok(()),
                Ok(Some(Err(e))) => return Err(e),
                Ok(Some(Ok(chunk))) => {
                    for event in decoder.push(&chunk)? {
                        self.on_stream_event(event).await;
                    }
                }
            }
        }
    }

    async fn on_stream_event(&self, event: SseEvent) {
        if !event.is(AUDIT_EVENT) {
            tracing::trace!(event = ?event.event, "audit: ignoring stream event");
            return;
        }
        let item: AuditItem = match serde_json::from_str(&event.data) {
            Ok(item) => item,
            Err(e) => {
                tracing::warn!("audit: bad stream payload: {e}");
                self.emit(SyncEvent::AuditError(format!("stream parse error: {e}")))
                    .await;
                return;
            }
        };
        let admission = lock(&self.inner.cursor).admit(item.id);
        if admission == Admission::Duplicate {
            tracing::trace!(id = ?item.id, "audit: duplicate stream item dropped");
            return;
        }
        self.emit(SyncEvent::AuditItem(item)).await;
    }

    async fn emit(&self, event: SyncEvent) {
        if self.inner.events.send(event).await.is_err() {
            tracing::debug!("audit: consumer gone, event dropped");
        }
    }
}
