//! Incremental decoding of the chat-completions event stream
//!
//! The transport hands over bytes in chunks of arbitrary size. The decoder
//! keeps whatever does not yet form a complete line and only decodes lines
//! once their terminating newline has arrived, so a chunk may end anywhere:
//! mid-line, mid-token or in the middle of a multibyte character.

use crate::types::StreamChunk;

/// Prefix of event lines that carry a payload
pub const EVENT_PREFIX: &str = "data:";

/// Payload that signals the end of the stream
pub const DONE_TOKEN: &str = "[DONE]";

/// A decoded unit of the event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Incremental reply text (never empty)
    ContentDelta(String),
    /// The termination token was received
    DoneMarker,
    /// An event payload that could not be parsed
    MalformedPayload(String),
}

/// Line-buffering decoder for one response stream.
///
/// Owned by a single session; no synchronization required.
#[derive(Debug, Default)]
pub struct StreamFrameDecoder {
    buffer: Vec<u8>,
    terminated: bool,
}

impl StreamFrameDecoder {
    /// Create a new decoder with an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw chunk and return the frames completed by it.
    ///
    /// Returns nothing until at least one newline has been buffered. Input
    /// received after the termination token is ignored.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        if self.terminated {
            tracing::trace!(bytes = chunk.len(), "Ignoring chunk after termination token");
            return Vec::new();
        }

        self.buffer.extend_from_slice(chunk);

        let Some(last_newline) = self.buffer.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let incomplete = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, incomplete);
        self.decode_lines(&complete)
    }

    /// Decode whatever is left in the buffer once the transport stream ends.
    pub fn finish(&mut self) -> Vec<Frame> {
        let tail = std::mem::take(&mut self.buffer);
        if self.terminated || tail.is_empty() {
            return Vec::new();
        }
        self.decode_lines(&tail)
    }

    /// Whether the termination token has been seen
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Number of bytes held back waiting for a newline
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    fn decode_lines(&mut self, bytes: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();

        for raw_line in bytes.split(|&b| b == b'\n') {
            // Invalid sequences become U+FFFD instead of failing the stream
            let line = String::from_utf8_lossy(raw_line);

            match decode_line(line.trim()) {
                Some(Frame::DoneMarker) => {
                    self.terminated = true;
                    self.buffer.clear();
                    frames.push(Frame::DoneMarker);
                    break;
                }
                Some(frame) => frames.push(frame),
                None => {}
            }
        }

        frames
    }
}

/// Decode a single, already trimmed line.
///
/// Blank lines, comments, heartbeats and any other non-event lines yield
/// `None`, as do well-formed payloads without incremental text.
pub fn decode_line(line: &str) -> Option<Frame> {
    if line.is_empty() {
        return None;
    }

    let payload = line.strip_prefix(EVENT_PREFIX)?.trim_start();

    if payload == DONE_TOKEN {
        return Some(Frame::DoneMarker);
    }

    match serde_json::from_str::<StreamChunk>(payload) {
        Ok(chunk) => chunk.into_delta_text().map(Frame::ContentDelta),
        Err(e) => {
            tracing::warn!(error = %e, payload, "Skipping malformed stream payload");
            Some(Frame::MalformedPayload(payload.to_string()))
        }
    }
}
