//! Events delivered from sync workers to the consumer loop.
//!
//! Workers never touch consumer state. Everything they learn crosses over
//! a bounded `mpsc` channel whose single receiver is owned by the console
//! loop, which applies the events in arrival order.

use serde_json::Value;
use tokio::sync::mpsc;
use trackside_core::analytics::{HistoricalSeries, KpiSnapshot};
use trackside_core::audit::AuditItem;
use trackside_core::hints::Hint;

pub const DEFAULT_EVENT_CAPACITY: usize = 256;

pub type EventSink = mpsc::Sender<SyncEvent>;

pub fn event_channel(capacity: usize) -> (EventSink, mpsc::Receiver<SyncEvent>) {
    mpsc::channel(capacity)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HintsOrigin {
    /// `GET /api/ai/hints`
    Primary,
    /// Remapped from `GET /api/suggestions`
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HintsUpdate {
    pub hints: Vec<Hint>,
    pub origin: HintsOrigin,
    /// Whether the fetch asked the server to recompute.
    pub recompute: bool,
    pub next_update: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Login accepted; commands may be issued.
    RpcReady,
    /// Terminal for the session. Emitted once per channel.
    RpcClosed { reason: Option<String> },
    /// Server notification forwarded by a registered handler.
    Notification { name: String, payload: Value },
    /// Response to a console-issued command.
    CommandReply { label: String, data: Value },

    HintsUpdated(HintsUpdate),
    HintsFailed(String),

    /// One backfill page, sorted by id. Never empty.
    AuditBatch(Vec<AuditItem>),
    AuditItem(AuditItem),
    AuditStream(StreamStatus),
    AuditError(String),

    Kpis(KpiSnapshot),
    Historical(HistoricalSeries),
    Overview(Value),
    MetricsFailed { key: String, error: String },
}
