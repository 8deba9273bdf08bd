//! Error types for the sync layer.

use thiserror::Error;
use trackside_core::WireError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("server rejected request: {0}")]
    Rejected(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("timed out: {0}")]
    Timeout(&'static str),

    #[error("rpc channel closed")]
    ChannelClosed,
}
