//! Networking module for the Paanj client SDK.
//!
//! This crate provides the two transports the SDK talks to:
//!
//! - **WebSocket event stream**: a single persistent connection that routes
//!   server events to registered handlers and reconnects after drops
//! - **HTTP API client**: JSON requests with API-key and bearer headers and a
//!   one-shot retry after a token refresh
//!
//! # WebSocket
//!
//! ```ignore
//! use paanj_net::websocket::{WebSocketClient, WebSocketConfig};
//!
//! let client = WebSocketClient::new(WebSocketConfig::new("ws://localhost:8090"));
//! client.on("message.create", |msg| println!("{} says {}", msg["senderId"], msg["content"]));
//! client.set_access_token(token);
//! client.connect().await?;
//! ```
//!
//! Inbound frames are JSON envelopes `{"type": ..., "data": ...}`. Chat
//! messages (`"type": "message"`) are delivered to `message.create` and to a
//! per-conversation event, with `senderId`, `conversationId` and `content`
//! aliases added. See [`websocket::MessageRouter`] for the full table.
//!
//! # HTTP
//!
//! ```ignore
//! use paanj_net::http::{ApiClient, HttpMethod};
//!
//! let api = ApiClient::new("http://localhost:3000", api_key)?;
//! let profile = api.get("/api/v1/users/me").await?;
//! ```

mod error;
pub mod http;
pub mod websocket;

pub use error::{NetworkError, Result};
pub use http::{ApiClient, HttpMethod};
pub use websocket::{ConnectionState, MessageRouter, WebSocketClient, WebSocketConfig};
