//! Error types for wire decoding.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),

    #[error("unknown time range: {0}")]
    UnknownTimeRange(String),

    #[error("unknown period: {0}")]
    UnknownPeriod(String),

    #[error("unknown signal status: {0}")]
    UnknownSignalStatus(String),

    #[error("event stream line exceeds {0} bytes")]
    LineTooLong(usize),
}
