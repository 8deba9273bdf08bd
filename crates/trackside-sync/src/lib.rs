//! trackside-sync: the realtime client synchronization layer.
//!
//! Four components keep the console's view consistent with the simulation
//! server, each delivering results as [`SyncEvent`]s over one bounded
//! channel to a single consumer loop:
//!
//! - [`RpcChannel`]: command/response/notification socket
//! - [`AuditTailer`]: backfill plus a persistent SSE tail
//! - [`PollingCoordinator`]: cooldown-throttled hints polling
//! - [`MetricsFetcher`]: independent metric fetches, newest reply wins

pub mod error;
pub mod event;
pub mod fetcher;
pub mod http;
pub mod poller;
pub mod rpc_channel;
pub mod tailer;

pub use error::SyncError;
pub use event::{EventSink, SyncEvent, event_channel};
pub use fetcher::MetricsFetcher;
pub use http::{ApiClient, ApiConfig};
pub use poller::PollingCoordinator;
pub use rpc_channel::{ChannelState, RpcChannel, RpcConfig};
pub use tailer::{AuditTailer, TailerConfig};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a std mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
