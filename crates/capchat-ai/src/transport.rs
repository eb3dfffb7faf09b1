//! Transport boundary: POST a request and receive the response incrementally

use std::pin::Pin;

use async_trait::async_trait;
use futures::StreamExt;
use tokio_stream::Stream;

use crate::{
    error::{Error, Result},
    types::{ChatRequest, DEFAULT_BASE_URL, ModelInfo, ModelList},
};

/// A stream of raw response chunks. Chunk sizes carry no meaning.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// Response headers have arrived; the body is still streaming
pub struct TransportResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body as it arrives
    pub body: ByteStream,
}

impl TransportResponse {
    /// Whether the status is in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Drain the body into a string (used for error bodies)
    pub async fn text(mut self) -> String {
        let mut bytes = Vec::new();
        while let Some(chunk) = self.body.next().await {
            match chunk {
                Ok(chunk) => bytes.extend_from_slice(&chunk),
                Err(e) => {
                    tracing::debug!("Error body truncated: {}", e);
                    break;
                }
            }
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// Anything that can POST a chat request and hand back a chunked body
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request; resolves once the status line and headers are in
    async fn send(&self, request: &ChatRequest) -> Result<TransportResponse>;
}

/// Chat-completions client over HTTP
pub struct HttpTransport {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl HttpTransport {
    /// Create a new transport with an API key, using the default endpoint
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Create from the `CAPCHAT_API_KEY` environment variable
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("CAPCHAT_API_KEY").map_err(|_| Error::InvalidApiKey)?;
        Ok(Self::new(api_key))
    }

    /// Point the transport at a different endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// The endpoint this transport talks to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn auth_header(&self) -> Result<reqwest::header::HeaderValue> {
        format!("Bearer {}", self.api_key)
            .parse()
            .map_err(|_| Error::InvalidApiKey)
    }

    /// List the models the endpoint offers
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = format!("{}/models", self.base_url);

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, self.auth_header()?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::api(status.as_u16(), text));
        }

        let list: ModelList = response.json().await?;
        Ok(list.data)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ChatRequest) -> Result<TransportResponse> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::AUTHORIZATION, self.auth_header()?);
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("text/event-stream"),
        );

        tracing::debug!(
            url = %url,
            model = %request.model,
            messages = request.messages.len(),
            "Sending chat request"
        );

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(request)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body: ByteStream = Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(Error::from)),
        );

        Ok(TransportResponse { status, body })
    }
}
