//! Client options.

use std::path::Path;
use std::time::Duration;

use paanj_core::DispatchPolicy;
use paanj_net::websocket::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_INTERVAL,
    ReconnectConfig, WebSocketConfig,
};
use serde::{Deserialize, Serialize};

use crate::error::{PaanjError, Result};

/// Default base URL of the HTTP API.
pub const DEFAULT_API_URL: &str = "http://localhost:3000";
/// Default base URL of the event server.
pub const DEFAULT_WS_URL: &str = "ws://localhost:8090";
/// Default path of the token refresh endpoint.
pub const DEFAULT_REFRESH_PATH: &str = "/api/v1/users/refresh";

/// Options for [`PaanjClient`](crate::PaanjClient).
///
/// Every field has a default, so a TOML file only needs the keys it changes.
/// Durations are given in milliseconds. `max_reconnect_attempts` takes a
/// count or the string `"unlimited"`:
///
/// ```toml
/// api_key = "pk_live_123"
/// ws_url = "wss://events.example.com"
/// auto_reconnect = true
/// reconnect_interval_ms = 2000
/// max_reconnect_attempts = "unlimited"
/// heartbeat_interval_ms = 30000
/// connect_timeout_ms = 10000
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Project API key. Required.
    pub api_key: String,
    /// Base URL of the HTTP API.
    pub api_url: String,
    /// Base URL of the event server.
    pub ws_url: String,
    /// Redial after the event stream drops.
    pub auto_reconnect: bool,
    /// Delay before each reconnect attempt.
    #[serde(rename = "reconnect_interval_ms", with = "duration_ms")]
    pub reconnect_interval: Duration,
    /// Reconnect attempts per outage. `None` retries forever.
    #[serde(with = "reconnect_attempts")]
    pub max_reconnect_attempts: Option<u32>,
    /// Interval for `{"type":"ping"}` frames. `None` disables them.
    #[serde(
        rename = "heartbeat_interval_ms",
        with = "option_duration_ms",
        skip_serializing_if = "Option::is_none"
    )]
    pub heartbeat_interval: Option<Duration>,
    /// Upper bound on a single WebSocket dial, handshake included.
    #[serde(rename = "connect_timeout_ms", with = "duration_ms")]
    pub connect_timeout: Duration,
    /// Path of the token refresh endpoint.
    pub refresh_path: String,
    /// Scheduling of event handlers.
    #[serde(skip)]
    pub dispatch: DispatchPolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            auto_reconnect: false,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            max_reconnect_attempts: Some(DEFAULT_MAX_RECONNECT_ATTEMPTS),
            heartbeat_interval: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            dispatch: DispatchPolicy::default(),
        }
    }
}

impl ClientOptions {
    /// Create options with the given API key and defaults for everything else.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Parse options from a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| PaanjError::Config(e.to_string()))
    }

    /// Read options from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| PaanjError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Set the HTTP API base URL.
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Set the event server base URL.
    pub fn ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    /// Enable or disable automatic reconnection.
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Set the delay before each reconnect attempt.
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Set the number of reconnect attempts per outage.
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = Some(attempts);
        self
    }

    /// Reconnect forever.
    pub fn unlimited_reconnect_attempts(mut self) -> Self {
        self.max_reconnect_attempts = None;
        self
    }

    /// Send heartbeat pings at this interval.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Bound the time a WebSocket dial may take.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the token refresh endpoint path.
    pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    /// Set the handler dispatch policy.
    pub fn dispatch(mut self, policy: DispatchPolicy) -> Self {
        self.dispatch = policy;
        self
    }

    /// Replace empty and zero values with their defaults.
    pub fn normalized(mut self) -> Self {
        if self.api_url.is_empty() {
            self.api_url = DEFAULT_API_URL.to_string();
        }
        if self.ws_url.is_empty() {
            self.ws_url = DEFAULT_WS_URL.to_string();
        }
        if self.reconnect_interval.is_zero() {
            self.reconnect_interval = DEFAULT_RECONNECT_INTERVAL;
        }
        if self.max_reconnect_attempts == Some(0) {
            self.max_reconnect_attempts = Some(DEFAULT_MAX_RECONNECT_ATTEMPTS);
        }
        if self.heartbeat_interval.is_some_and(|interval| interval.is_zero()) {
            self.heartbeat_interval = None;
        }
        if self.connect_timeout.is_zero() {
            self.connect_timeout = DEFAULT_CONNECT_TIMEOUT;
        }
        if self.refresh_path.is_empty() {
            self.refresh_path = DEFAULT_REFRESH_PATH.to_string();
        }
        self
    }

    /// Build the event-stream configuration described by these options.
    pub fn websocket_config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::new(self.ws_url.clone())
            .dispatch(self.dispatch)
            .connect_timeout(self.connect_timeout);
        if self.auto_reconnect {
            config = config.reconnect(ReconnectConfig {
                interval: self.reconnect_interval,
                max_attempts: self.max_reconnect_attempts,
            });
        }
        if let Some(interval) = self.heartbeat_interval {
            config = config.heartbeat(interval);
        }
        config
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod option_duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        duration: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match duration {
            Some(duration) => super::duration_ms::serialize(duration, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}

/// A reconnect attempt limit, or `"unlimited"` for `None`.
mod reconnect_attempts {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    const UNLIMITED: &str = "unlimited";

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Attempts {
        Count(u32),
        Keyword(String),
    }

    pub fn serialize<S: Serializer>(
        attempts: &Option<u32>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match attempts {
            Some(count) => serializer.serialize_u32(*count),
            None => serializer.serialize_str(UNLIMITED),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<u32>, D::Error> {
        match Attempts::deserialize(deserializer)? {
            Attempts::Count(count) => Ok(Some(count)),
            Attempts::Keyword(keyword) if keyword == UNLIMITED => Ok(None),
            Attempts::Keyword(other) => Err(D::Error::custom(format!(
                "expected an attempt count or \"{UNLIMITED}\", found \"{other}\""
            ))),
        }
    }
}
