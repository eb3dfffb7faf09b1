//! Scripted transport for tests

use std::time::Duration;

use async_trait::async_trait;
use capchat_ai::{ByteStream, ChatRequest, Error, Result, Transport, TransportResponse};
use parking_lot::Mutex;

pub(crate) fn delta_line(text: &str) -> String {
    let payload = format!(
        "{{\"choices\":[{{\"delta\":{{\"content\":{:?}}}}}]}}",
        text
    );
    format!("data: {}\n", payload)
}

/// Replies to every request with the same scripted response
pub(crate) struct ScriptedTransport {
    status: u16,
    chunks: Vec<Vec<u8>>,
    break_with: Option<String>,
    unreachable: Option<String>,
    chunk_delay: Option<Duration>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn ok(chunks: Vec<&str>) -> Self {
        Self {
            status: 200,
            chunks: chunks.into_iter().map(|c| c.as_bytes().to_vec()).collect(),
            break_with: None,
            unreachable: None,
            chunk_delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            ..Self::ok(vec![body])
        }
    }

    pub(crate) fn unreachable(message: &str) -> Self {
        Self {
            unreachable: Some(message.to_string()),
            ..Self::ok(vec![])
        }
    }

    /// End the body with a transport error after the scripted chunks
    pub(crate) fn then_break(mut self, message: &str) -> Self {
        self.break_with = Some(message.to_string());
        self
    }

    /// Sleep between chunks so sessions overlap
    pub(crate) fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    pub(crate) fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ChatRequest) -> Result<TransportResponse> {
        self.requests.lock().push(request.clone());

        if let Some(ref message) = self.unreachable {
            return Err(Error::Transport(message.clone()));
        }

        let chunks = self.chunks.clone();
        let break_with = self.break_with.clone();
        let delay = self.chunk_delay;

        let body: ByteStream = Box::pin(async_stream::stream! {
            for chunk in chunks {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                } else {
                    tokio::task::yield_now().await;
                }
                yield Ok(chunk);
            }
            if let Some(message) = break_with {
                yield Err(Error::Transport(message));
            }
        });

        Ok(TransportResponse {
            status: self.status,
            body,
        })
    }
}
