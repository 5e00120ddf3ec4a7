//! WebSocket connection manager with registry-based event delivery.

use std::fmt;
use std::sync::{Arc, Once};

use futures_util::{SinkExt, StreamExt};
use paanj_core::EventRegistry;
use paanj_core::logging::targets;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use super::config::WebSocketConfig;
use super::router::MessageRouter;
use super::state::ConnectionState;
use crate::error::{NetworkError, Result};

/// Type alias for a connected WebSocket stream.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Local event emitted after every successful dial. Payload is `null`.
pub const CONNECTED_EVENT: &str = "connected";
/// Local event emitted after every drop or explicit disconnect. Payload is `null`.
pub const DISCONNECTED_EVENT: &str = "disconnected";
/// Local event emitted when reconnection gives up. Payload is `{"attempts": n}`.
pub const RECONNECT_FAILED_EVENT: &str = "reconnect.failed";

const PING_FRAME: &str = r#"{"type":"ping"}"#;

/// Build the URL dialed for `base` and `token`: `<base>/ws?token=<token>`.
///
/// The token is query-encoded. A trailing slash on `base` is ignored.
///
/// # Example
///
/// ```
/// use paanj_net::websocket::connection_url;
///
/// let url = connection_url("ws://localhost:8090/", "a b").unwrap();
/// assert_eq!(url.as_str(), "ws://localhost:8090/ws?token=a+b");
/// ```
pub fn connection_url(base: &str, token: &str) -> Result<Url> {
    let mut url = Url::parse(&format!("{}/ws", base.trim_end_matches('/')))
        .map_err(|e| NetworkError::Connection(format!("invalid WebSocket URL `{base}`: {e}")))?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url)
}

/// Commands sent from the client handle to the connection task.
enum Command {
    /// Write one text frame and report the outcome.
    Send(String, oneshot::Sender<Result<()>>),
    /// Send a normal close frame and stop.
    Close,
}

/// How a connection task's session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SessionEnd {
    /// `disconnect()` was called.
    Closed,
    /// Read error, server close, or write failure.
    Dropped,
}

/// Mutable connection state, guarded by a single lock.
struct ConnectionInner {
    state: ConnectionState,
    access_token: String,
    /// Bumped by every `connect()` and `disconnect()`; a connection task
    /// whose generation is stale stops without touching the state.
    generation: u64,
    command_tx: Option<mpsc::UnboundedSender<Command>>,
    reconnect_attempt: u32,
}

struct Shared {
    config: WebSocketConfig,
    inner: Mutex<ConnectionInner>,
    /// Serializes dials so concurrent `connect()` calls open one socket.
    dial_lock: tokio::sync::Mutex<()>,
    /// Publishes every generation bump so dials and reconnect waits of a
    /// superseded generation stop early.
    generations: watch::Sender<u64>,
    registry: EventRegistry<Value>,
    router: MessageRouter,
}

/// A client for the Paanj event stream.
///
/// Owns at most one socket. A single background task per connection reads
/// frames, hands them to the [`MessageRouter`], writes outgoing frames and,
/// when reconnection is configured, redials after a drop.
///
/// The client is cheaply cloneable; clones share the connection and the
/// handler registry.
///
/// # Example
///
/// ```ignore
/// use paanj_net::websocket::{ReconnectConfig, WebSocketClient, WebSocketConfig};
///
/// let config = WebSocketConfig::new("ws://localhost:8090")
///     .reconnect(ReconnectConfig::new());
/// let client = WebSocketClient::new(config);
///
/// client.on("message.create", |msg| println!("new message: {msg}"));
/// client.set_access_token("token");
/// client.connect().await?;
/// ```
#[derive(Clone)]
pub struct WebSocketClient {
    shared: Arc<Shared>,
}

impl WebSocketClient {
    /// Create a new client. Does not connect.
    pub fn new(config: WebSocketConfig) -> Self {
        let registry = EventRegistry::with_policy(config.dispatch);
        let router = MessageRouter::new(registry.clone()).with_discard_hook(config.discard_hook.clone());
        let (generations, _) = watch::channel(0);

        Self {
            shared: Arc::new(Shared {
                config,
                inner: Mutex::new(ConnectionInner {
                    state: ConnectionState::Disconnected,
                    access_token: String::new(),
                    generation: 0,
                    command_tx: None,
                    reconnect_attempt: 0,
                }),
                dial_lock: tokio::sync::Mutex::new(()),
                generations,
                registry,
                router,
            }),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &WebSocketConfig {
        &self.shared.config
    }

    /// Get the base URL.
    pub fn url(&self) -> &str {
        &self.shared.config.url
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Get the number of reconnect attempts made during the current outage.
    pub fn reconnect_attempt(&self) -> u32 {
        self.shared.inner.lock().reconnect_attempt
    }

    /// Set the token used to build the URL of the next dial.
    ///
    /// Does not affect an open connection.
    pub fn set_access_token(&self, token: impl Into<String>) {
        self.shared.inner.lock().access_token = token.into();
    }

    /// Get the current access token.
    pub fn access_token(&self) -> String {
        self.shared.inner.lock().access_token.clone()
    }

    /// Get the handler registry.
    pub fn registry(&self) -> &EventRegistry<Value> {
        &self.shared.registry
    }

    /// Get the router used for inbound frames.
    pub fn router(&self) -> &MessageRouter {
        &self.shared.router
    }

    /// Register a handler for `event`.
    pub fn on<F>(&self, event: impl Into<String>, handler: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.shared.registry.on(event, handler);
    }

    /// Dispatch a local event to the registered handlers.
    ///
    /// Returns the number of handlers dispatched.
    pub fn emit(&self, event: &str, payload: Value) -> usize {
        self.shared.registry.emit(event, payload)
    }

    /// Open the connection.
    ///
    /// Returns immediately when already connected. Otherwise dials
    /// `<url>/ws?token=<access token>`, transitions to
    /// [`Connected`](ConnectionState::Connected), emits `"connected"` and
    /// starts the background connection task.
    ///
    /// Calling `connect()` while a reconnect is pending cancels it and dials
    /// right away, even when the reconnect dial is still in flight.
    #[tracing::instrument(skip(self), target = "paanj_net::websocket", fields(url = %self.shared.config.url))]
    pub async fn connect(&self) -> Result<()> {
        let shared = &self.shared;
        {
            let mut inner = shared.inner.lock();
            if inner.state == ConnectionState::Reconnecting {
                shared.bump_generation(&mut inner);
                inner.state = ConnectionState::Disconnected;
                inner.reconnect_attempt = 0;
                tracing::debug!(target: targets::WEBSOCKET, "pending reconnect cancelled by connect");
            }
        }

        let _dial = shared.dial_lock.lock().await;

        let (token, generation) = {
            let mut inner = shared.inner.lock();
            if inner.state == ConnectionState::Connected {
                return Ok(());
            }
            let generation = shared.bump_generation(&mut inner);
            inner.state = ConnectionState::Connecting;
            inner.reconnect_attempt = 0;
            (inner.access_token.clone(), generation)
        };

        let stream = match shared.dial_for(&token, generation).await {
            Ok(stream) => stream,
            Err(err) => {
                let mut inner = shared.inner.lock();
                if inner.generation == generation {
                    inner.state = ConnectionState::Disconnected;
                }
                drop(inner);
                tracing::warn!(target: targets::WEBSOCKET, error = %err, "connect failed");
                return Err(err);
            }
        };

        let Some(commands) = shared.install(generation) else {
            return Err(NetworkError::Connection(
                "connection cancelled by disconnect".into(),
            ));
        };

        tracing::info!(target: targets::WEBSOCKET, "connected");
        shared.registry.emit(CONNECTED_EVENT, Value::Null);
        tokio::spawn(supervise(shared.clone(), stream, commands, generation));
        Ok(())
    }

    /// Close the connection and stop reconnecting.
    ///
    /// Sends a normal close frame when a socket is open. Cancels a pending
    /// reconnect wait and any dial in flight. Idempotent.
    pub fn disconnect(&self) {
        let command_tx = {
            let mut inner = self.shared.inner.lock();
            self.shared.bump_generation(&mut inner);
            inner.state = ConnectionState::Disconnected;
            inner.reconnect_attempt = 0;
            inner.command_tx.take()
        };

        if let Some(tx) = command_tx {
            let _ = tx.send(Command::Close);
            tracing::info!(target: targets::WEBSOCKET, "disconnected");
            self.shared.registry.emit(DISCONNECTED_EVENT, Value::Null);
        }
    }

    /// Serialize `payload` as JSON and send it as one text frame.
    ///
    /// Fails with [`NetworkError::NotConnected`] unless connected.
    pub async fn send<T: Serialize + ?Sized>(&self, payload: &T) -> Result<()> {
        let command_tx = self
            .shared
            .inner
            .lock()
            .command_tx
            .clone()
            .ok_or(NetworkError::NotConnected)?;

        let text = serde_json::to_string(payload)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        command_tx
            .send(Command::Send(text, reply_tx))
            .map_err(|_| NetworkError::NotConnected)?;

        reply_rx
            .await
            .map_err(|_| NetworkError::Transport("connection closed before the frame was written".into()))?
    }

    /// Send `{"type":"subscribe","data":<subscription>}`.
    pub async fn subscribe(&self, subscription: &Value) -> Result<()> {
        self.send(&json!({ "type": "subscribe", "data": subscription }))
            .await
    }
}

impl Shared {
    /// Supersede the current generation. Returns the new one.
    fn bump_generation(&self, inner: &mut ConnectionInner) -> u64 {
        inner.generation += 1;
        self.generations.send_replace(inner.generation);
        inner.generation
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.lock().generation == generation
    }

    /// Resolve once `generation` has been superseded.
    async fn superseded(&self, generation: u64) {
        let mut generations = self.generations.subscribe();
        let _ = generations.wait_for(|current| *current != generation).await;
    }

    /// Dial on behalf of `generation`, giving up as soon as it is superseded.
    async fn dial_for(&self, token: &str, generation: u64) -> Result<WsStream> {
        tokio::select! {
            result = self.dial(token) => result,
            () = self.superseded(generation) => Err(NetworkError::Connection(
                "connection cancelled by disconnect".into(),
            )),
        }
    }

    /// Open a socket with the given token. Never touches the connection state.
    async fn dial(&self, token: &str) -> Result<WsStream> {
        let url = connection_url(&self.config.url, token)?;
        if url.scheme() == "wss" {
            install_crypto_provider();
        }

        let request = url
            .as_str()
            .into_client_request()
            .map_err(|e| NetworkError::Connection(e.to_string()))?;

        let handshake = tokio_tungstenite::connect_async(request);
        let (stream, _response) = match self.config.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, handshake)
                .await
                .map_err(|_| NetworkError::Connection(format!("connect timed out after {limit:?}")))?,
            None => handshake.await,
        }
        .map_err(|e| NetworkError::Connection(e.to_string()))?;

        Ok(stream)
    }

    /// Mark the connection open for `generation` and create its command channel.
    ///
    /// Returns `None` when the generation is stale.
    fn install(&self, generation: u64) -> Option<mpsc::UnboundedReceiver<Command>> {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return None;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        inner.command_tx = Some(tx);
        inner.state = ConnectionState::Connected;
        inner.reconnect_attempt = 0;
        Some(rx)
    }

    /// Tear down after a drop. Returns `false` when the generation is stale.
    fn mark_dropped(&self, generation: u64) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                return false;
            }
            inner.state = ConnectionState::Disconnected;
            inner.command_tx = None;
        }

        tracing::warn!(target: targets::WEBSOCKET, "connection lost");
        self.registry.emit(DISCONNECTED_EVENT, Value::Null);
        true
    }

    /// Read frames and write commands until the session ends.
    async fn run_session(
        &self,
        stream: WsStream,
        mut commands: mpsc::UnboundedReceiver<Command>,
    ) -> SessionEnd {
        let (mut write, mut read) = stream.split();
        let mut heartbeat = self.config.heartbeat_interval.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            tokio::select! {
                cmd = commands.recv() => {
                    match cmd {
                        Some(Command::Send(text, reply)) => {
                            let result = write
                                .send(Message::Text(text.into()))
                                .await
                                .map_err(|e| NetworkError::Transport(e.to_string()));
                            let failed = result.is_err();
                            let _ = reply.send(result);
                            if failed {
                                return SessionEnd::Dropped;
                            }
                        }
                        Some(Command::Close) | None => {
                            let frame = CloseFrame {
                                code: CloseCode::Normal,
                                reason: String::from("client disconnect").into(),
                            };
                            let _ = write.send(Message::Close(Some(frame))).await;
                            return SessionEnd::Closed;
                        }
                    }
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.router.route(text.as_str());
                        }
                        Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                            Ok(text) => {
                                self.router.route(text);
                            }
                            Err(_) => {
                                tracing::debug!(target: targets::WEBSOCKET, len = data.len(), "discarding non-UTF-8 binary frame");
                            }
                        },
                        Some(Ok(Message::Close(frame))) => {
                            tracing::debug!(target: targets::WEBSOCKET, ?frame, "server closed connection");
                            return SessionEnd::Dropped;
                        }
                        Some(Ok(_)) => {
                            // Ping/pong and raw frames are handled by tungstenite.
                        }
                        Some(Err(err)) => {
                            tracing::warn!(target: targets::WEBSOCKET, error = %err, "read error");
                            return SessionEnd::Dropped;
                        }
                        None => return SessionEnd::Dropped,
                    }
                }

                _ = next_tick(&mut heartbeat) => {
                    if let Err(err) = write.send(Message::Text(PING_FRAME.into())).await {
                        tracing::warn!(target: targets::WEBSOCKET, error = %err, "heartbeat failed");
                        return SessionEnd::Dropped;
                    }
                }
            }
        }
    }

    /// Redial at the configured interval until a dial succeeds, attempts run
    /// out, or the generation goes stale.
    async fn reconnect(
        &self,
        generation: u64,
    ) -> Option<(WsStream, mpsc::UnboundedReceiver<Command>)> {
        let policy = self.config.reconnect.clone()?;

        loop {
            let attempt = {
                let mut inner = self.inner.lock();
                if inner.generation != generation {
                    return None;
                }
                if !policy.allows(inner.reconnect_attempt) {
                    let attempts = inner.reconnect_attempt;
                    inner.state = ConnectionState::Disconnected;
                    drop(inner);

                    tracing::warn!(target: targets::WEBSOCKET, attempts, "giving up reconnecting");
                    self.registry
                        .emit(RECONNECT_FAILED_EVENT, json!({ "attempts": attempts }));
                    return None;
                }
                inner.reconnect_attempt += 1;
                inner.state = ConnectionState::Reconnecting;
                inner.reconnect_attempt
            };

            tracing::info!(target: targets::WEBSOCKET, attempt, delay = ?policy.interval, "reconnecting");
            tokio::select! {
                () = tokio::time::sleep(policy.interval) => {}
                () = self.superseded(generation) => return None,
            }

            let _dial = self.dial_lock.lock().await;
            let token = {
                let inner = self.inner.lock();
                if inner.generation != generation {
                    return None;
                }
                inner.access_token.clone()
            };

            match self.dial_for(&token, generation).await {
                Ok(stream) => {
                    let commands = self.install(generation)?;
                    tracing::info!(target: targets::WEBSOCKET, attempt, "reconnected");
                    self.registry.emit(CONNECTED_EVENT, Value::Null);
                    return Some((stream, commands));
                }
                Err(_) if !self.is_current(generation) => return None,
                Err(err) => {
                    tracing::warn!(target: targets::WEBSOCKET, attempt, error = %err, "reconnect attempt failed");
                }
            }
        }
    }
}

/// Connection task: runs sessions back to back until the connection is
/// closed for good.
async fn supervise(
    shared: Arc<Shared>,
    mut stream: WsStream,
    mut commands: mpsc::UnboundedReceiver<Command>,
    generation: u64,
) {
    loop {
        if shared.run_session(stream, commands).await == SessionEnd::Closed {
            return;
        }
        if !shared.mark_dropped(generation) {
            return;
        }
        match shared.reconnect(generation).await {
            Some((next_stream, next_commands)) => {
                stream = next_stream;
                commands = next_commands;
            }
            None => return,
        }
    }
}

/// Wait for the next heartbeat tick, or forever when heartbeats are off.
async fn next_tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn install_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        // Another provider may already be installed by the application.
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

impl fmt::Debug for WebSocketClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("WebSocketClient")
            .field("url", &self.shared.config.url)
            .field("state", &inner.state)
            .field("reconnect_attempt", &inner.reconnect_attempt)
            .finish()
    }
}
