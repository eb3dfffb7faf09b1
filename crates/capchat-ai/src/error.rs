//! Error types for capchat-ai

use thiserror::Error;

/// Result type alias using capchat-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the inference service
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed (connection, DNS, TLS, timeout)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API answered with a non-success status
    #[error("API request failed: {status} - {body}")]
    Api { status: u16, body: String },

    /// Invalid API key
    #[error("Invalid or missing API key")]
    InvalidApiKey,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Transport-level failure not raised by the HTTP client itself
    #[error("Transport error: {0}")]
    Transport(String),
}

impl Error {
    /// Create an API error from a status code and response body
    pub fn api(status: u16, body: impl Into<String>) -> Self {
        Self::Api {
            status,
            body: body.into(),
        }
    }

    /// Whether this error happened below the HTTP status layer
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Http(_) | Error::Transport(_))
    }
}
