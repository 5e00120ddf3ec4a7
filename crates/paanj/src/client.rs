//! The client façade.

use std::fmt;
use std::sync::{Arc, Weak};

use paanj_core::logging::targets;
use paanj_net::NetworkError;
use paanj_net::http::{ApiClient, HttpMethod};
use paanj_net::websocket::WebSocketClient;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::error::{PaanjError, Result};
use crate::options::ClientOptions;

/// Local event emitted after anonymous authentication.
pub const USER_CREATED_EVENT: &str = "user.created";
/// Local event emitted when a session is injected or refreshed.
pub const TOKEN_UPDATED_EVENT: &str = "token.updated";
/// Endpoint creating an anonymous user.
pub const ANONYMOUS_USER_PATH: &str = "/api/v1/users/anonymous";

/// Tokens issued by the API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    /// Bearer token for HTTP requests and the event stream.
    pub access_token: String,
    /// Token exchanged for a new access token.
    pub refresh_token: String,
    /// Identifier of the authenticated user.
    pub user_id: String,
    /// Access token lifetime in seconds, when the server reports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

impl AuthResponse {
    /// Decode an authentication response body.
    ///
    /// `previous` supplies the refresh token and user id when a refresh
    /// response omits them.
    fn from_body(body: &Map<String, Value>, previous: Option<&Session>) -> Result<Self> {
        let access_token = body
            .get("accessToken")
            .and_then(Value::as_str)
            .ok_or_else(|| PaanjError::InvalidResponse("missing `accessToken`".into()))?
            .to_string();

        let refresh_token = match (body.get("refreshToken").and_then(Value::as_str), previous) {
            (Some(token), _) => token.to_string(),
            (None, Some(previous)) => previous.refresh_token.clone(),
            (None, None) => {
                return Err(PaanjError::InvalidResponse("missing `refreshToken`".into()));
            }
        };

        let user_id = match body.get("userId") {
            Some(value) if !value.is_null() => render_user_id(value),
            _ => previous.map(|p| p.user_id.clone()).unwrap_or_default(),
        };

        Ok(Self {
            access_token,
            refresh_token,
            user_id,
            expires_in: body.get("expiresIn").and_then(Value::as_u64),
        })
    }

    /// Payload of `user.created` and `token.updated`.
    fn event_payload(&self) -> Value {
        json!({
            "userId": self.user_id,
            "accessToken": self.access_token,
            "refreshToken": self.refresh_token,
        })
    }
}

/// Render a user id that the server may send as a string or a number.
fn render_user_id(value: &Value) -> String {
    match value {
        Value::String(id) => id.clone(),
        Value::Number(n) => match (n.as_u64(), n.as_i64(), n.as_f64()) {
            (Some(id), _, _) => id.to_string(),
            (_, Some(id), _) => id.to_string(),
            (_, _, Some(id)) => format!("{id:.0}"),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

#[derive(Clone, Debug, Default)]
struct Session {
    access_token: String,
    refresh_token: String,
    user_id: String,
}

struct ClientInner {
    options: ClientOptions,
    ws: WebSocketClient,
    api: ApiClient,
    session: RwLock<Session>,
}

impl ClientInner {
    fn store(&self, session: Session) {
        self.ws.set_access_token(session.access_token.clone());
        self.api.set_access_token(session.access_token.clone());
        *self.session.write() = session;
    }

    fn store_auth(&self, auth: &AuthResponse) {
        self.store(Session {
            access_token: auth.access_token.clone(),
            refresh_token: auth.refresh_token.clone(),
            user_id: auth.user_id.clone(),
        });
    }

    async fn refresh(&self) -> Result<AuthResponse> {
        let current = self.session.read().clone();
        if current.refresh_token.is_empty() {
            return Err(PaanjError::NotAuthenticated);
        }

        let body = json!({ "refreshToken": current.refresh_token });
        let response = self
            .api
            .request(HttpMethod::Post, &self.options.refresh_path, Some(&body), true)
            .await?
            .ok_or_else(|| PaanjError::InvalidResponse("empty refresh response".into()))?;

        let auth = AuthResponse::from_body(&response, Some(&current))?;
        self.store_auth(&auth);
        tracing::info!(target: targets::SESSION, user_id = %auth.user_id, "access token refreshed");
        self.ws.emit(TOKEN_UPDATED_EVENT, auth.event_payload());
        Ok(auth)
    }
}

/// Entry point of the SDK.
///
/// Holds the session, keeps the WebSocket and HTTP clients in sync with it,
/// and refreshes the access token when the API answers 401.
///
/// The client is cheaply cloneable; clones share the session and the
/// connection.
///
/// # Example
///
/// ```ignore
/// use paanj::{ClientOptions, PaanjClient};
/// use serde_json::json;
///
/// let client = PaanjClient::new(ClientOptions::new("pk_live_123").auto_reconnect(true))?;
/// client.authenticate_anonymous(&json!({ "name": "Ada" }), &json!({})).await?;
///
/// client.on("message.create", |msg| println!("{}: {}", msg["senderId"], msg["content"]));
/// client.connect().await?;
/// ```
#[derive(Clone)]
pub struct PaanjClient {
    inner: Arc<ClientInner>,
}

impl PaanjClient {
    /// Create a client. Does not connect.
    ///
    /// Fails with [`PaanjError::MissingApiKey`] when the API key is empty.
    pub fn new(options: ClientOptions) -> Result<Self> {
        if options.api_key.trim().is_empty() {
            return Err(PaanjError::MissingApiKey);
        }
        let options = options.normalized();

        let ws = WebSocketClient::new(options.websocket_config());
        let api = ApiClient::new(options.api_url.clone(), options.api_key.clone())?;

        let inner = Arc::new(ClientInner {
            options,
            ws,
            api,
            session: RwLock::new(Session::default()),
        });
        install_refresh_hook(&inner);

        Ok(Self { inner })
    }

    /// Get the normalized options.
    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    /// Get the event-stream client.
    pub fn websocket(&self) -> &WebSocketClient {
        &self.inner.ws
    }

    /// Get the HTTP API client.
    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    /// Create an anonymous user and start a session for it.
    ///
    /// Emits `user.created` with `{"userId", "accessToken", "refreshToken"}`.
    #[tracing::instrument(skip_all, target = "paanj::session")]
    pub async fn authenticate_anonymous(
        &self,
        user: &Value,
        private_data: &Value,
    ) -> Result<AuthResponse> {
        let body = json!({ "user": user, "private": private_data });
        let response = self
            .inner
            .api
            .request(HttpMethod::Post, ANONYMOUS_USER_PATH, Some(&body), true)
            .await?
            .ok_or_else(|| PaanjError::InvalidResponse("empty authentication response".into()))?;

        let auth = AuthResponse::from_body(&response, None)?;
        self.inner.store_auth(&auth);
        tracing::info!(target: targets::SESSION, user_id = %auth.user_id, "anonymous user created");
        self.inner.ws.emit(USER_CREATED_EVENT, auth.event_payload());
        Ok(auth)
    }

    /// Start a session from tokens obtained elsewhere.
    ///
    /// Emits `token.updated`. The open connection, if any, keeps its
    /// original token until the next dial.
    pub fn authenticate_with_token(
        &self,
        access_token: impl Into<String>,
        user_id: impl Into<String>,
        refresh_token: impl Into<String>,
    ) {
        let auth = AuthResponse {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            user_id: user_id.into(),
            expires_in: None,
        };
        self.inner.store_auth(&auth);
        tracing::debug!(target: targets::SESSION, user_id = %auth.user_id, "session injected");
        self.inner.ws.emit(TOKEN_UPDATED_EVENT, auth.event_payload());
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// Emits `token.updated`. Fails with [`PaanjError::NotAuthenticated`]
    /// when no refresh token is held.
    pub async fn refresh_access_token(&self) -> Result<AuthResponse> {
        self.inner.refresh().await
    }

    /// Open the event stream using the current access token.
    pub async fn connect(&self) -> Result<()> {
        Ok(self.inner.ws.connect().await?)
    }

    /// Close the event stream.
    pub fn disconnect(&self) {
        self.inner.ws.disconnect();
    }

    /// Check if the event stream is open.
    pub fn is_connected(&self) -> bool {
        self.inner.ws.is_connected()
    }

    /// Check if an access token is held.
    pub fn is_authenticated(&self) -> bool {
        !self.inner.session.read().access_token.is_empty()
    }

    /// Get the id of the authenticated user, or an empty string.
    pub fn user_id(&self) -> String {
        self.inner.session.read().user_id.clone()
    }

    /// Get the current access token, if any.
    pub fn access_token(&self) -> Option<String> {
        let token = self.inner.session.read().access_token.clone();
        (!token.is_empty()).then_some(token)
    }

    /// Ask the server to deliver events matching `subscription`.
    pub async fn subscribe(&self, subscription: &Value) -> Result<()> {
        Ok(self.inner.ws.subscribe(subscription).await?)
    }

    /// Send a JSON frame on the event stream.
    pub async fn send<T: Serialize + ?Sized>(&self, payload: &T) -> Result<()> {
        Ok(self.inner.ws.send(payload).await?)
    }

    /// Register a handler for `event`.
    pub fn on<F>(&self, event: impl Into<String>, handler: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner.ws.on(event, handler);
    }
}

/// Route 401 responses through the client's refresh flow.
///
/// The hook holds a weak reference so the API client does not keep the
/// façade alive.
fn install_refresh_hook(inner: &Arc<ClientInner>) {
    let weak: Weak<ClientInner> = Arc::downgrade(inner);
    inner.api.set_refresh_hook(move || {
        let weak = weak.clone();
        async move {
            let inner = weak
                .upgrade()
                .ok_or_else(|| NetworkError::Authentication("client dropped".into()))?;
            match inner.refresh().await {
                Ok(_) => Ok(()),
                Err(PaanjError::Network(err)) => Err(err),
                Err(err) => Err(NetworkError::Authentication(err.to_string())),
            }
        }
    });
}

impl fmt::Debug for PaanjClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaanjClient")
            .field("api_url", &self.inner.options.api_url)
            .field("ws_url", &self.inner.options.ws_url)
            .field("user_id", &self.inner.session.read().user_id)
            .field("state", &self.inner.ws.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_user_id() {
        assert_eq!(render_user_id(&json!("u1")), "u1");
        assert_eq!(render_user_id(&json!(42)), "42");
        assert_eq!(render_user_id(&json!(-7)), "-7");
        assert_eq!(render_user_id(&json!(1.0e3)), "1000");
        assert_eq!(render_user_id(&json!(true)), "true");
        assert_eq!(render_user_id(&json!({"id": 1})), r#"{"id":1}"#);
    }

    #[test]
    fn test_auth_response_requires_tokens() {
        let Value::Object(body) = json!({"refreshToken": "r"}) else {
            unreachable!()
        };
        assert!(matches!(
            AuthResponse::from_body(&body, None),
            Err(PaanjError::InvalidResponse(_))
        ));

        let Value::Object(body) = json!({"accessToken": "a"}) else {
            unreachable!()
        };
        assert!(matches!(
            AuthResponse::from_body(&body, None),
            Err(PaanjError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_auth_response_falls_back_to_previous_session() {
        let previous = Session {
            access_token: "old".into(),
            refresh_token: "r1".into(),
            user_id: "u1".into(),
        };
        let Value::Object(body) = json!({"accessToken": "new", "expiresIn": 900}) else {
            unreachable!()
        };

        let auth = AuthResponse::from_body(&body, Some(&previous)).unwrap();
        assert_eq!(auth.access_token, "new");
        assert_eq!(auth.refresh_token, "r1");
        assert_eq!(auth.user_id, "u1");
        assert_eq!(auth.expires_in, Some(900));
    }

    #[test]
    fn test_event_payload_shape() {
        let auth = AuthResponse {
            access_token: "a".into(),
            refresh_token: "r".into(),
            user_id: "u".into(),
            expires_in: Some(60),
        };
        assert_eq!(
            auth.event_payload(),
            json!({"userId": "u", "accessToken": "a", "refreshToken": "r"})
        );
    }
}
