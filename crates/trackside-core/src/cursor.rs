//! Stream cursor shared by the audit backfill and the push stream.
//!
//! Two positions are tracked:
//!
//! - `high_water`: the largest id delivered so far. Non-decreasing; this
//!   is what a gap backfill passes as `sinceId`.
//! - `floor`: every id at or below it counts as delivered. Raised by an
//!   explicit `sinceId` and by window eviction.
//!
//! Ids above the floor that were delivered are kept in a bounded window,
//! so an item seen by both the backfill and the stream is emitted once,
//! whichever source reports it first.

use std::collections::BTreeSet;

/// Ids remembered above the floor before the oldest are folded into it.
pub const DEFAULT_DEDUP_WINDOW: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Not delivered before; the cursor now covers it.
    Fresh,
    /// Already delivered (or at/below the floor); drop it.
    Duplicate,
    /// Item without a usable id; delivered as-is, cursor untouched.
    Untracked,
}

#[derive(Debug, Clone)]
pub struct StreamCursor {
    high_water: u64,
    floor: u64,
    recent: BTreeSet<u64>,
    window: usize,
}

impl Default for StreamCursor {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamCursor {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_DEDUP_WINDOW)
    }

    pub fn with_window(window: usize) -> Self {
        Self {
            high_water: 0,
            floor: 0,
            recent: BTreeSet::new(),
            window: window.max(1),
        }
    }

    /// Largest delivered id.
    pub fn position(&self) -> u64 {
        self.high_water
    }

    pub fn floor(&self) -> u64 {
        self.floor
    }

    /// `cursor = max(cursor, since)`; ids at or below `since` become
    /// duplicates.
    pub fn raise_to(&mut self, since: u64) {
        if since > self.floor {
            self.floor = since;
            self.recent.retain(|&id| id > since);
        }
        self.high_water = self.high_water.max(since);
    }

    pub fn admit(&mut self, id: Option<u64>) -> Admission {
        let Some(id) = id else {
            return Admission::Untracked;
        };
        if id <= self.floor || !self.recent.insert(id) {
            return Admission::Duplicate;
        }
        self.high_water = self.high_water.max(id);
        while self.recent.len() > self.window {
            if let Some(oldest) = self.recent.pop_first() {
                self.floor = oldest;
            }
        }
        Admission::Fresh
    }
}
