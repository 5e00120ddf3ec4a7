//! WebSocket client configuration.

use std::fmt;
use std::time::Duration;

use paanj_core::DispatchPolicy;

use super::router::DiscardHook;

/// Default delay between reconnect attempts.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// Default number of reconnect attempts before giving up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Default upper bound on a single dial, handshake included.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(45);

/// Configuration for the event-stream WebSocket client.
#[derive(Clone)]
pub struct WebSocketConfig {
    /// Base URL of the event server (e.g. `ws://localhost:8090`).
    ///
    /// The client appends `/ws?token=<access token>` when dialing.
    pub url: String,
    /// Reconnection policy. `None` disables automatic reconnection.
    pub reconnect: Option<ReconnectConfig>,
    /// Interval for application-level `{"type":"ping"}` frames. `None` disables them.
    pub heartbeat_interval: Option<Duration>,
    /// Upper bound on a single dial including the handshake. `None` waits
    /// for the operating system to give up.
    pub connect_timeout: Option<Duration>,
    /// How handler invocations are scheduled.
    pub dispatch: DispatchPolicy,
    /// Called with the raw text of every inbound frame that is discarded.
    pub discard_hook: Option<DiscardHook>,
}

impl WebSocketConfig {
    /// Create a configuration for the given base URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: None,
            heartbeat_interval: None,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            dispatch: DispatchPolicy::default(),
            discard_hook: None,
        }
    }

    /// Enable automatic reconnection with the given policy.
    pub fn reconnect(mut self, config: ReconnectConfig) -> Self {
        self.reconnect = Some(config);
        self
    }

    /// Disable automatic reconnection.
    pub fn no_reconnect(mut self) -> Self {
        self.reconnect = None;
        self
    }

    /// Send a `{"type":"ping"}` frame at this interval while connected.
    pub fn heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Bound the time a single dial may take.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Let a dial take as long as the operating system allows.
    pub fn no_connect_timeout(mut self) -> Self {
        self.connect_timeout = None;
        self
    }

    /// Set the handler dispatch policy.
    pub fn dispatch(mut self, policy: DispatchPolicy) -> Self {
        self.dispatch = policy;
        self
    }

    /// Observe frames dropped by the router.
    pub fn on_discard<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &serde_json::Error) + Send + Sync + 'static,
    {
        self.discard_hook = Some(std::sync::Arc::new(hook));
        self
    }
}

impl fmt::Debug for WebSocketConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketConfig")
            .field("url", &self.url)
            .field("reconnect", &self.reconnect)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("connect_timeout", &self.connect_timeout)
            .field("dispatch", &self.dispatch)
            .field("discard_hook", &self.discard_hook.is_some())
            .finish()
    }
}

/// Configuration for automatic reconnection.
///
/// Attempts are spaced by a fixed interval; there is no backoff.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before every reconnect attempt.
    pub interval: Duration,
    /// Attempts allowed per outage. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RECONNECT_INTERVAL,
            max_attempts: Some(DEFAULT_MAX_RECONNECT_ATTEMPTS),
        }
    }
}

impl ReconnectConfig {
    /// Create a reconnect policy with the default interval and attempt limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the delay before every attempt.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the number of attempts per outage.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Retry forever.
    pub fn unlimited_attempts(mut self) -> Self {
        self.max_attempts = None;
        self
    }

    /// Check whether another attempt is allowed after `attempts_made` failures.
    pub fn allows(&self, attempts_made: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempts_made < max)
    }
}
