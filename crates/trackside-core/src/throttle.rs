//! Cooldown throttle with request coalescing.
//!
//! Pure decision machine behind the hints poller. The caller supplies the
//! clock and performs whatever the returned [`RefreshDecision`] asks for.
//!
//! ## States
//!
//! - idle: nothing in flight, cooldown elapsed
//! - fetching: one fetch in flight; new requests fold into `pending_recompute`
//! - cooling down: a fetch started less than `cooldown` ago; one deferred
//!   retry is scheduled and carries the accumulated recompute flag
//!
//! At most one fetch is in flight and at most one deferred retry is
//! scheduled at any time.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshDecision {
    /// Launch a fetch now.
    Start { recompute: bool },
    /// A fetch is running; the request was folded into the pending flag.
    Coalesced,
    /// Schedule the single deferred retry after `delay`.
    Deferred { delay: Duration },
    /// Folded into the retry that is already scheduled.
    AlreadyDeferred,
}

#[derive(Debug, Clone)]
pub struct ThrottleState {
    cooldown: Duration,
    in_flight: bool,
    last_fetch_start: Option<Instant>,
    pending_recompute: bool,
    deferred_scheduled: bool,
}

impl ThrottleState {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            in_flight: false,
            last_fetch_start: None,
            pending_recompute: false,
            deferred_scheduled: false,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn pending_recompute(&self) -> bool {
        self.pending_recompute
    }

    pub fn deferred_scheduled(&self) -> bool {
        self.deferred_scheduled
    }

    pub fn request(&mut self, recompute: bool, now: Instant) -> RefreshDecision {
        if self.in_flight {
            self.pending_recompute |= recompute;
            return RefreshDecision::Coalesced;
        }

        if let Some(started) = self.last_fetch_start {
            let elapsed = now.saturating_duration_since(started);
            if elapsed < self.cooldown {
                self.pending_recompute |= recompute;
                if self.deferred_scheduled {
                    return RefreshDecision::AlreadyDeferred;
                }
                self.deferred_scheduled = true;
                return RefreshDecision::Deferred {
                    delay: self.cooldown - elapsed,
                };
            }
        }

        self.in_flight = true;
        self.last_fetch_start = Some(now);
        let recompute = recompute || std::mem::take(&mut self.pending_recompute);
        RefreshDecision::Start { recompute }
    }

    /// The deferred retry fired; re-request with whatever accumulated.
    pub fn fire_deferred(&mut self, now: Instant) -> RefreshDecision {
        self.deferred_scheduled = false;
        let recompute = std::mem::take(&mut self.pending_recompute);
        self.request(recompute, now)
    }

    /// The in-flight fetch finished. Returns `Some(recompute)` when a
    /// follow-up refresh is owed for requests folded in while busy.
    pub fn complete(&mut self) -> Option<bool> {
        self.in_flight = false;
        if std::mem::take(&mut self.pending_recompute) {
            Some(true)
        } else {
            None
        }
    }
}
