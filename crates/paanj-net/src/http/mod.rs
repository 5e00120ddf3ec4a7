//! HTTP client for the Paanj JSON API.
//!
//! # Example
//!
//! ```ignore
//! use paanj_net::http::{ApiClient, HttpMethod};
//! use serde_json::json;
//!
//! let client = ApiClient::new("http://localhost:3000", "pk_live_123")?;
//! client.set_access_token("token");
//!
//! let body = json!({ "user": { "name": "Ada" }, "private": false });
//! let created = client
//!     .request(HttpMethod::Post, "/api/v1/users/anonymous", Some(&body), true)
//!     .await?;
//! ```

mod client;
mod method;

pub use client::{API_KEY_HEADER, ApiClient, ApiClientBuilder, ApiClientConfig, RefreshHook};
pub use method::HttpMethod;
