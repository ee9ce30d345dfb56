//! Error type shared by the model client adapters.

/// Errors that can occur when talking to a model backend.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level failure (connect, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("Backend returned {status}: {body}")]
    Api { status: u16, body: String },

    /// The backend answered 2xx but the payload had an unexpected shape.
    #[error("Unexpected response shape: {0}")]
    Decode(String),

    /// The backend reported a structured error object.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Client construction failed (bad base URL, invalid header).
    #[error("Invalid client configuration: {0}")]
    Config(String),
}
