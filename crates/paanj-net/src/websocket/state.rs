//! Connection state for the WebSocket client.

/// Current state of the event-stream connection.
///
/// Only [`Connected`](Self::Connected) counts as connected; the other states
/// all reject [`send`](super::WebSocketClient::send) with `NotConnected`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected to any server.
    #[default]
    Disconnected,
    /// A dial initiated by `connect()` is in progress.
    Connecting,
    /// Connected and ready to send/receive frames.
    Connected,
    /// Connection lost; waiting for the reconnect interval or redialing.
    Reconnecting,
}

impl ConnectionState {
    /// Check if this state represents an open connection.
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Reconnecting => write!(f, "Reconnecting"),
        }
    }
}
