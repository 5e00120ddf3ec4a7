//! WebSocket event stream.
//!
//! [`WebSocketClient`] keeps one connection to the event server, routes every
//! inbound frame through a [`MessageRouter`] into an
//! [`EventRegistry`](paanj_core::EventRegistry), and optionally redials after
//! the link drops.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use paanj_net::websocket::{ReconnectConfig, WebSocketClient, WebSocketConfig};
//!
//! let config = WebSocketConfig::new("ws://localhost:8090")
//!     .reconnect(ReconnectConfig::new().interval(Duration::from_secs(2)))
//!     .heartbeat(Duration::from_secs(30));
//!
//! let client = WebSocketClient::new(config);
//! client.on("conversation:c1:message.create", |msg| {
//!     println!("{}", msg["content"]);
//! });
//! client.on("reconnect.failed", |info| {
//!     eprintln!("gave up after {} attempts", info["attempts"]);
//! });
//!
//! client.set_access_token("token");
//! client.connect().await?;
//! client.subscribe(&serde_json::json!({ "conversationId": "c1" })).await?;
//! ```

mod client;
mod config;
mod router;
mod state;

pub use client::{
    CONNECTED_EVENT, DISCONNECTED_EVENT, RECONNECT_FAILED_EVENT, WebSocketClient, connection_url,
};
pub use config::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_INTERVAL,
    ReconnectConfig, WebSocketConfig,
};
pub use router::{
    DiscardHook, MESSAGE_CREATE, MessageRouter, RouteOutcome, alias_chat_fields,
    conversation_event,
};
pub use state::ConnectionState;
