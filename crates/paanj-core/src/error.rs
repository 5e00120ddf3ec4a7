//! Error types for the core crate.

/// Errors raised by the core systems.
///
/// Handler failures never propagate to the emitter; they are converted into
/// this type only so they can be logged with a consistent shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// An event handler panicked while processing a payload.
    #[error("handler for event `{event}` panicked: {message}")]
    HandlerPanicked {
        /// The event the handler was registered under.
        event: String,
        /// The panic payload rendered as text.
        message: String,
    },
}

/// A specialized Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
