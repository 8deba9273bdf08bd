//! Cooldown-throttled hints polling.
//!
//! `refresh` never blocks and never runs two fetches at once. Requests
//! that arrive while a fetch is running, or inside the cooldown window
//! after one started, are folded into a single follow-up that recomputes
//! if any of them asked to. See [`ThrottleState`] for the decision rules.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use trackside_core::command::{ConsoleCommand, SuggestionCommand};
use trackside_core::rpc::is_status_ok;
use trackside_core::throttle::{RefreshDecision, ThrottleState};

use crate::error::SyncError;
use crate::event::{EventSink, HintsOrigin, HintsUpdate, SyncEvent};
use crate::http::HintsSource;
use crate::lock;
use crate::rpc_channel::RpcChannel;

pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(1000);
pub const DEFAULT_AUTO_INTERVAL: Duration = Duration::from_secs(180);

struct Inner<S> {
    source: Arc<S>,
    throttle: Mutex<ThrottleState>,
    events: EventSink,
}

pub struct PollingCoordinator<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for PollingCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: HintsSource> PollingCoordinator<S> {
    pub fn new(source: Arc<S>, cooldown: Duration, events: EventSink) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                throttle: Mutex::new(ThrottleState::new(cooldown)),
                events,
            }),
        }
    }

    /// Request a hints refresh. Returns immediately.
    pub fn refresh(&self, force_recompute: bool) {
        let decision = lock(&self.inner.throttle).request(force_recompute, now());
        self.apply(decision);
    }

    fn apply(&self, decision: RefreshDecision) {
        match decision {
            RefreshDecision::Start { recompute } => {
                tracing::debug!(recompute, "hints: fetch started");
                let this = self.clone();
                tokio::spawn(async move { this.run_fetch(recompute).await });
            }
            RefreshDecision::Deferred { delay } => {
                tracing::debug!(delay_ms = delay.as_millis() as u64, "hints: deferred retry scheduled");
                let this = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let decision = lock(&this.inner.throttle).fire_deferred(now());
                    this.apply(decision);
                });
            }
            RefreshDecision::Coalesced | RefreshDecision::AlreadyDeferred => {
                tracing::trace!(?decision, "hints: request coalesced");
            }
        }
    }

    async fn run_fetch(&self, recompute: bool) {
        let event = match self.fetch_with_fallback(recompute).await {
            Ok(update) => SyncEvent::HintsUpdated(update),
            Err(e) => {
                tracing::warn!("hints: {e}");
                SyncEvent::HintsFailed(e)
            }
        };
        let follow_up = lock(&self.inner.throttle).complete();
        if self.inner.events.send(event).await.is_err() {
            tracing::debug!("hints: consumer gone, result dropped");
        }
        if let Some(recompute) = follow_up {
            self.refresh(recompute);
        }
    }

    async fn fetch_with_fallback(&self, recompute: bool) -> Result<HintsUpdate, String> {
        let primary = match self.inner.source.fetch_hints(recompute).await {
            Ok(payload) => {
                return Ok(HintsUpdate {
                    hints: payload.hints,
                    origin: HintsOrigin::Primary,
                    recompute,
                    next_update: payload.next_update,
                });
            }
            Err(e) => e,
        };
        tracing::info!("hints: primary fetch failed ({primary}), trying suggestions");
        match self.inner.source.fetch_suggestions().await {
            Ok(payload) => {
                let payload = payload.into_hints(&Utc::now().to_rfc3339());
                Ok(HintsUpdate {
                    hints: payload.hints,
                    origin: HintsOrigin::Fallback,
                    recompute,
                    next_update: None,
                })
            }
            Err(fallback) => Err(format!(
                "hints fetch failed: {primary}; suggestions fallback failed: {fallback}"
            )),
        }
    }

    /// Refresh every `period` until cancelled. The first tick fires
    /// immediately.
    pub fn run_periodic(&self, period: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => this.refresh(false),
                }
            }
            tracing::debug!("hints: periodic refresh stopped");
        })
    }

    /// Accept a suggestion over RPC; a recompute follows the server's ack.
    pub fn accept(&self, rpc: &RpcChannel, id: &str) -> Result<(), SyncError> {
        self.send_verdict(rpc, SuggestionCommand::Accept { id: id.to_string() })
    }

    /// Reject a suggestion for `minutes`; a recompute follows the ack.
    pub fn reject(&self, rpc: &RpcChannel, id: &str, minutes: u32) -> Result<(), SyncError> {
        self.send_verdict(
            rpc,
            SuggestionCommand::Reject {
                id: id.to_string(),
                minutes,
            },
        )
    }

    fn send_verdict(&self, rpc: &RpcChannel, command: SuggestionCommand) -> Result<(), SyncError> {
        let this = self.clone();
        let call = ConsoleCommand::Suggestion(command).to_call();
        rpc.send_call(
            call,
            Some(Box::new(move |data| {
                if is_status_ok(&data) || data.get("status").is_none() {
                    this.refresh(true);
                } else {
                    tracing::warn!(response = %data, "hints: suggestion verdict rejected");
                }
            })),
        )?;
        Ok(())
    }
}

fn now() -> std::time::Instant {
    Instant::now().into_std()
}
