//! capchat-ai: chat-completions wire protocol
//!
//! This crate knows how to talk to an OpenAI-compatible chat-completions
//! endpoint: it builds the outgoing request, decodes the chunked
//! event-stream response into typed frames, and hides the HTTP client
//! behind the [`Transport`] trait.

pub mod decoder;
pub mod error;
pub mod transport;
pub mod types;

pub use decoder::{Frame, StreamFrameDecoder};
pub use error::{Error, Result};
pub use transport::{ByteStream, HttpTransport, Transport, TransportResponse};
pub use types::*;
