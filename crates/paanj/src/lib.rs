//! Paanj client SDK.
//!
//! This is the main crate that ties the event stream and the HTTP API to a
//! user session.
//!
//! # Example
//!
//! ```no_run
//! use paanj::{ClientOptions, PaanjClient};
//! use serde_json::json;
//!
//! # async fn run() -> paanj::Result<()> {
//! let client = PaanjClient::new(
//!     ClientOptions::new("pk_live_123")
//!         .api_url("https://api.example.com")
//!         .ws_url("wss://events.example.com")
//!         .auto_reconnect(true),
//! )?;
//!
//! client.on("user.created", |session| println!("user {}", session["userId"]));
//! client.authenticate_anonymous(&json!({ "name": "Ada" }), &json!(null)).await?;
//!
//! client.on("conversation:c1:message.create", |msg| {
//!     println!("{}: {}", msg["senderId"], msg["content"]);
//! });
//! client.connect().await?;
//! client.subscribe(&json!({ "conversationId": "c1" })).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Events
//!
//! Handlers receive a `serde_json::Value`. Server events arrive under their
//! `type`; chat messages under `message.create` and
//! `conversation:<id>:message.create`. The SDK also emits local events:
//!
//! | event              | payload                                      |
//! |--------------------|----------------------------------------------|
//! | `connected`        | `null`                                       |
//! | `disconnected`     | `null`                                       |
//! | `reconnect.failed` | `{"attempts": n}`                            |
//! | `user.created`     | `{"userId", "accessToken", "refreshToken"}`  |
//! | `token.updated`    | `{"userId", "accessToken", "refreshToken"}`  |
//!
//! # Logging
//!
//! The SDK logs through `tracing`; see [`logging`] for target names.

mod client;
mod error;
mod options;

pub use client::{
    ANONYMOUS_USER_PATH, AuthResponse, PaanjClient, TOKEN_UPDATED_EVENT, USER_CREATED_EVENT,
};
pub use error::{PaanjError, Result};
pub use options::{ClientOptions, DEFAULT_API_URL, DEFAULT_REFRESH_PATH, DEFAULT_WS_URL};

pub use paanj_core::{DispatchPolicy, EventRegistry, logging};

/// Transport clients.
pub mod net {
    pub use paanj_net::*;
}
