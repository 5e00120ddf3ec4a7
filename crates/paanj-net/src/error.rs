//! Error types for the networking module.

/// Network-specific errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    /// Dialing or the WebSocket handshake failed, or the URL was unusable.
    #[error("Connection error: {0}")]
    Connection(String),
    /// An operation that needs an open connection was attempted while disconnected.
    #[error("WebSocket not connected")]
    NotConnected,
    /// Writing to an open socket failed, or the connection dropped mid-write.
    #[error("Transport error: {0}")]
    Transport(String),
    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),
    /// HTTP request failed before a response was received.
    #[error("HTTP request error: {0}")]
    Request(String),
    /// HTTP error status (4xx or 5xx).
    #[error("HTTP {status}{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    HttpStatus {
        /// The HTTP status code.
        status: u16,
        /// Response body text, if any.
        message: Option<String>,
    },
    /// Request timed out.
    #[error("Request timed out")]
    Timeout,
    /// Authentication or token refresh failed.
    #[error("Authentication error: {0}")]
    Authentication(String),
}

impl NetworkError {
    /// Get the HTTP status code if this is an [`HttpStatus`](Self::HttpStatus) error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connection(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}

impl From<serde_json::Error> for NetworkError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// A specialized Result type for network operations.
pub type Result<T> = std::result::Result<T, NetworkError>;
