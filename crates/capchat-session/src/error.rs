//! Error types for capchat-session

use thiserror::Error;

/// Result type alias using capchat-session Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned synchronously to whoever starts a session.
///
/// Failures of the request itself never surface here; they arrive as the
/// terminal event of the session.
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the wire protocol layer
    #[error(transparent)]
    Ai(#[from] capchat_ai::Error),

    /// Another open session already uses this correlation id
    #[error("Correlation id already in use: {0}")]
    DuplicateCorrelationId(String),

    /// `start` was called outside a tokio runtime
    #[error("No async runtime available to run the session")]
    NoRuntime,
}
