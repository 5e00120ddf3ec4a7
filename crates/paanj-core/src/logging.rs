//! Logging facilities for the Paanj SDK.
//!
//! The SDK uses the `tracing` crate for instrumentation and never installs a
//! subscriber itself. To see logs, install one in your application:
//!
//! ```ignore
//! fn main() {
//!     tracing_subscriber::fmt()
//!         .with_env_filter("paanj_net=debug,paanj=info")
//!         .init();
//!
//!     // Your application code...
//! }
//! ```
//!
//! Every log line is emitted with one of the [`targets`] below, so a single
//! subsystem can be enabled with an `EnvFilter` directive such as
//! `paanj_net::websocket=trace`.

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core crate target.
    pub const CORE: &str = "paanj_core";
    /// Event registry and handler dispatch.
    pub const REGISTRY: &str = "paanj_core::registry";
    /// WebSocket connection lifecycle and read loop.
    pub const WEBSOCKET: &str = "paanj_net::websocket";
    /// Inbound frame classification.
    pub const ROUTER: &str = "paanj_net::router";
    /// HTTP API requests.
    pub const HTTP: &str = "paanj_net::http";
    /// Session façade (authentication, token refresh).
    pub const SESSION: &str = "paanj::session";
}
