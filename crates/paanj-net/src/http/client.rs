//! JSON API client.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use paanj_core::logging::targets;
use parking_lot::RwLock;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use serde_json::{Map, Value};

use super::method::HttpMethod;
use crate::error::{NetworkError, Result};

/// Header carrying the project API key on every request.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Callback invoked when a request is rejected with 401.
///
/// On `Ok(())` the hook is expected to have stored a fresh access token with
/// [`ApiClient::set_access_token`]; the request is then retried once.
pub type RefreshHook = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Configuration for the API client.
#[derive(Clone, Debug)]
pub struct ApiClientConfig {
    /// Base URL that request paths are appended to.
    pub base_url: String,
    /// Project API key sent as `x-api-key`.
    pub api_key: String,
    /// Request timeout.
    pub timeout: Option<Duration>,
    /// Connect timeout.
    pub connect_timeout: Option<Duration>,
    /// User agent.
    pub user_agent: Option<String>,
}

impl ApiClientConfig {
    /// Create a configuration with default timeouts.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout: Some(Duration::from_secs(30)),
            connect_timeout: Some(Duration::from_secs(10)),
            user_agent: Some(format!("PaanjClient/{} (Rust)", env!("CARGO_PKG_VERSION"))),
        }
    }
}

/// Builder for creating an API client with custom configuration.
pub struct ApiClientBuilder {
    config: ApiClientConfig,
}

impl ApiClientBuilder {
    /// Create a new builder with default timeouts.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            config: ApiClientConfig::new(base_url, api_key),
        }
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Disable request timeout.
    pub fn no_timeout(mut self) -> Self {
        self.config.timeout = None;
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Set the user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(user_agent.into());
        self
    }

    /// Build the API client.
    pub fn build(self) -> Result<ApiClient> {
        let mut builder = reqwest::Client::builder();

        if let Some(timeout) = self.config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(connect_timeout) = self.config.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }
        if let Some(ref ua) = self.config.user_agent {
            builder = builder.user_agent(ua);
        }

        let client = builder.build()?;

        Ok(ApiClient {
            inner: Arc::new(ApiClientInner {
                client,
                config: self.config,
                access_token: RwLock::new(None),
                refresh_hook: RwLock::new(None),
            }),
        })
    }
}

struct ApiClientInner {
    client: reqwest::Client,
    config: ApiClientConfig,
    access_token: RwLock<Option<String>>,
    refresh_hook: RwLock<Option<RefreshHook>>,
}

/// A client for the Paanj JSON API.
///
/// Every request carries `Content-Type: application/json` and the API key;
/// the bearer token is attached unless the request opts out. A 401 triggers
/// the refresh hook once, followed by a single retry.
///
/// The client is cheaply cloneable; clones share the token and the hook.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

impl ApiClient {
    /// Create a client with default configuration.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        ApiClientBuilder::new(base_url, api_key).build()
    }

    /// Create a builder for custom configuration.
    pub fn builder(base_url: impl Into<String>, api_key: impl Into<String>) -> ApiClientBuilder {
        ApiClientBuilder::new(base_url, api_key)
    }

    /// Get the configuration.
    pub fn config(&self) -> &ApiClientConfig {
        &self.inner.config
    }

    /// Set the bearer token. An empty token is treated as no token.
    pub fn set_access_token(&self, token: impl Into<String>) {
        let token = token.into();
        *self.inner.access_token.write() = (!token.is_empty()).then_some(token);
    }

    /// Forget the bearer token.
    pub fn clear_access_token(&self) {
        *self.inner.access_token.write() = None;
    }

    /// Get the bearer token, if any.
    pub fn access_token(&self) -> Option<String> {
        self.inner.access_token.read().clone()
    }

    /// Install the callback run when a request is rejected with 401.
    pub fn set_refresh_hook<F, Fut>(&self, hook: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let hook: RefreshHook = Arc::new(move || hook().boxed());
        *self.inner.refresh_hook.write() = Some(hook);
    }

    /// Build the absolute URL for `path`.
    pub fn url(&self, path: &str) -> String {
        let base = self.inner.config.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }

    /// Send a JSON request and decode a JSON object response.
    ///
    /// Returns `Ok(None)` when the response body is empty or not a JSON
    /// object. Status codes of 400 and above become
    /// [`NetworkError::HttpStatus`] with the body text as message.
    #[tracing::instrument(skip_all, target = "paanj_net::http", fields(%method, path = %path))]
    pub async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
        skip_auth: bool,
    ) -> Result<Option<Map<String, Value>>> {
        let mut response = self.send(method, path, body, skip_auth).await?;

        if response.status() == StatusCode::UNAUTHORIZED && !skip_auth {
            let hook = self.inner.refresh_hook.read().clone();
            if let Some(hook) = hook {
                match hook().await {
                    Ok(()) => {
                        tracing::debug!(target: targets::HTTP, "retrying after token refresh");
                        response = self.send(method, path, body, skip_auth).await?;
                    }
                    Err(err) => {
                        tracing::warn!(target: targets::HTTP, error = %err, "token refresh failed");
                    }
                }
            }
        }

        let status = response.status();
        if status.as_u16() >= 400 {
            let message = response.text().await.ok().filter(|text| !text.is_empty());
            tracing::debug!(target: targets::HTTP, status = status.as_u16(), "request rejected");
            return Err(NetworkError::HttpStatus {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice::<Map<String, Value>>(&bytes).ok())
    }

    /// Shorthand for an authenticated GET.
    pub async fn get(&self, path: &str) -> Result<Option<Map<String, Value>>> {
        self.request(HttpMethod::Get, path, None, false).await
    }

    /// Shorthand for an authenticated POST with a JSON body.
    pub async fn post(&self, path: &str, body: &Value) -> Result<Option<Map<String, Value>>> {
        self.request(HttpMethod::Post, path, Some(body), false).await
    }

    async fn send(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
        skip_auth: bool,
    ) -> Result<reqwest::Response> {
        let mut request = self
            .inner
            .client
            .request(method.into(), self.url(path))
            .header(CONTENT_TYPE, "application/json")
            .header(API_KEY_HEADER, &self.inner.config.api_key);

        if !skip_auth && let Some(token) = self.access_token() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        tracing::trace!(target: targets::HTTP, %method, path, "sending request");
        Ok(request.send().await?)
    }
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.config.base_url)
            .field("authenticated", &self.inner.access_token.read().is_some())
            .field("refresh_hook", &self.inner.refresh_hook.read().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let client = ApiClient::new("http://localhost:3000/", "key").unwrap();
        assert_eq!(client.url("/api/v1/users"), "http://localhost:3000/api/v1/users");
        assert_eq!(client.url("health"), "http://localhost:3000/health");
    }

    #[test]
    fn test_empty_token_is_no_token() {
        let client = ApiClient::new("http://localhost:3000", "key").unwrap();
        client.set_access_token("");
        assert_eq!(client.access_token(), None);
        client.set_access_token("abc");
        assert_eq!(client.access_token().as_deref(), Some("abc"));
        client.clear_access_token();
        assert_eq!(client.access_token(), None);
    }
}
