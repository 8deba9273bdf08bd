//! Incremental decoder for `text/event-stream` bodies.
//!
//! Chunks arrive with arbitrary boundaries, so bytes are buffered until a
//! full line is available. Within a block:
//!
//! - `:`-prefixed lines are comments (server heartbeats such as `:hb`)
//! - `event:` names the block, `data:` appends a payload line
//! - other fields (`id:`, `retry:`) are ignored
//!
//! A blank (or whitespace-only) line ends the block. Blocks without data
//! are not dispatched, and a trailing block with no terminating blank line
//! is never emitted. A line longer than [`MAX_LINE_BYTES`] is an error.

use crate::error::WireError;

pub const MAX_LINE_BYTES: usize = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
}

impl SseEvent {
    pub fn is(&self, name: &str) -> bool {
        self.event.as_deref() == Some(name)
    }
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns every block completed by it.
    ///
    /// After an error the decoder state is unspecified; open a new stream.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, WireError> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.feed_line(&line) {
                out.push(event);
            }
        }
        if self.buf.len() > MAX_LINE_BYTES {
            self.buf.clear();
            return Err(WireError::LineTooLong(MAX_LINE_BYTES));
        }
        Ok(out)
    }

    fn feed_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.trim().is_empty() {
            let event = self.event.take();
            if self.data.is_empty() {
                return None;
            }
            let data = std::mem::take(&mut self.data).join("\n");
            return Some(SseEvent { event, data });
        }
        if line.starts_with(':') {
            return None;
        }
        if let Some(name) = line.strip_prefix("event:") {
            self.event = Some(name.trim().to_string());
        } else if let Some(data) = line.strip_prefix("data:") {
            self.data.push(data.trim().to_string());
        }
        None
    }
}
