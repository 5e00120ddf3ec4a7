//! Error types for the client façade.

use paanj_net::NetworkError;

/// Errors returned by [`PaanjClient`](crate::PaanjClient).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaanjError {
    /// The options did not include an API key.
    #[error("API key is required")]
    MissingApiKey,
    /// The operation needs a session (or a refresh token) that is not present.
    #[error("not authenticated")]
    NotAuthenticated,
    /// The server answered with a body that lacks required fields.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// Options could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
    /// Transport-level failure.
    #[error(transparent)]
    Network(#[from] NetworkError),
}

/// A specialized Result type for client operations.
pub type Result<T> = std::result::Result<T, PaanjError>;
