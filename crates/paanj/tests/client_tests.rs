//! Integration tests for the client façade.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use paanj::{ClientOptions, PaanjClient, PaanjError};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Poll `condition` until it holds or `timeout` elapses.
async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("paanj=debug,paanj_net=debug")
        .with_test_writer()
        .try_init();
}

fn recorder() -> (Arc<Mutex<Vec<Value>>>, impl Fn(&Value) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |value: &Value| sink.lock().push(value.clone()))
}

#[test]
fn test_missing_api_key() {
    let err = PaanjClient::new(ClientOptions::default()).unwrap_err();
    assert_eq!(err, PaanjError::MissingApiKey);

    let err = PaanjClient::new(ClientOptions::new("   ")).unwrap_err();
    assert_eq!(err, PaanjError::MissingApiKey);
}

#[test]
fn test_options_are_normalized() {
    let client = PaanjClient::new(
        ClientOptions::new("key")
            .api_url("")
            .reconnect_interval(Duration::ZERO)
            .max_reconnect_attempts(0),
    )
    .expect("client");

    assert_eq!(client.options().api_url, "http://localhost:3000");
    assert_eq!(client.options().reconnect_interval, Duration::from_secs(5));
    assert_eq!(client.options().max_reconnect_attempts, Some(10));
    assert!(!client.is_authenticated());
    assert!(!client.is_connected());
    assert_eq!(client.user_id(), "");
}

#[tokio::test]
async fn test_authenticate_anonymous() {
    init_tracing();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/users/anonymous"))
        .and(header("x-api-key", "pk_test"))
        .and(body_json(json!({"user": {"name": "Ada"}, "private": {"plan": "free"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "acc-1",
            "refreshToken": "ref-1",
            "userId": 12345,
            "expiresIn": 3600,
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = PaanjClient::new(ClientOptions::new("pk_test").api_url(mock_server.uri()))
        .expect("client");
    let (created, on_created) = recorder();
    client.on("user.created", on_created);

    let auth = client
        .authenticate_anonymous(&json!({"name": "Ada"}), &json!({"plan": "free"}))
        .await
        .expect("authentication");

    assert_eq!(auth.access_token, "acc-1");
    assert_eq!(auth.refresh_token, "ref-1");
    assert_eq!(auth.user_id, "12345");
    assert_eq!(auth.expires_in, Some(3600));

    assert!(client.is_authenticated());
    assert_eq!(client.user_id(), "12345");
    assert_eq!(client.access_token().as_deref(), Some("acc-1"));
    assert_eq!(client.websocket().access_token(), "acc-1");
    assert_eq!(client.api().access_token().as_deref(), Some("acc-1"));

    assert!(wait_until(Duration::from_secs(1), || created.lock().len() == 1).await);
    assert_eq!(
        created.lock()[0],
        json!({"userId": "12345", "accessToken": "acc-1", "refreshToken": "ref-1"})
    );

    let requests = mock_server.received_requests().await.expect("recording enabled");
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_authenticate_anonymous_rejects_incomplete_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/users/anonymous"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"userId": "u1"})))
        .mount(&mock_server)
        .await;

    let client = PaanjClient::new(ClientOptions::new("pk_test").api_url(mock_server.uri()))
        .expect("client");
    let err = client
        .authenticate_anonymous(&json!({}), &Value::Null)
        .await
        .unwrap_err();

    assert!(matches!(err, PaanjError::InvalidResponse(_)));
    assert!(!client.is_authenticated());
}

#[tokio::test]
async fn test_authenticate_anonymous_http_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/users/anonymous"))
        .respond_with(ResponseTemplate::new(403).set_body_string("bad key"))
        .mount(&mock_server)
        .await;

    let client = PaanjClient::new(ClientOptions::new("pk_test").api_url(mock_server.uri()))
        .expect("client");
    let err = client
        .authenticate_anonymous(&json!({}), &Value::Null)
        .await
        .unwrap_err();

    match err {
        PaanjError::Network(network) => assert_eq!(network.status(), Some(403)),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_authenticate_with_token() {
    let client = PaanjClient::new(ClientOptions::new("pk_test")).expect("client");
    let (updated, on_updated) = recorder();
    client.on("token.updated", on_updated);

    client.authenticate_with_token("acc", "u7", "ref");

    assert!(client.is_authenticated());
    assert_eq!(client.user_id(), "u7");
    assert_eq!(client.websocket().access_token(), "acc");
    assert_eq!(client.api().access_token().as_deref(), Some("acc"));

    assert!(wait_until(Duration::from_secs(1), || updated.lock().len() == 1).await);
    assert_eq!(
        updated.lock()[0],
        json!({"userId": "u7", "accessToken": "acc", "refreshToken": "ref"})
    );
}

#[tokio::test]
async fn test_refresh_without_session_fails() {
    let client = PaanjClient::new(ClientOptions::new("pk_test")).expect("client");
    let err = client.refresh_access_token().await.unwrap_err();
    assert_eq!(err, PaanjError::NotAuthenticated);
}

#[tokio::test]
async fn test_refresh_access_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/users/refresh"))
        .and(body_json(json!({"refreshToken": "ref-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "acc-2",
            "refreshToken": "ref-2",
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = PaanjClient::new(ClientOptions::new("pk_test").api_url(mock_server.uri()))
        .expect("client");
    client.authenticate_with_token("acc-1", "u1", "ref-1");

    let (updated, on_updated) = recorder();
    client.on("token.updated", on_updated);

    let auth = client.refresh_access_token().await.expect("refresh");
    assert_eq!(auth.access_token, "acc-2");
    assert_eq!(auth.refresh_token, "ref-2");
    assert_eq!(auth.user_id, "u1");
    assert_eq!(client.access_token().as_deref(), Some("acc-2"));

    assert!(wait_until(Duration::from_secs(1), || updated.lock().len() == 1).await);
    assert_eq!(updated.lock()[0]["accessToken"], "acc-2");
}

#[tokio::test]
async fn test_unauthorized_request_refreshes_through_client() {
    init_tracing();
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/conversations"))
        .and(header("authorization", "Bearer expired"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/custom/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "fresh",
            "refreshToken": "ref-2",
            "userId": "u1",
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/conversations"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = PaanjClient::new(
        ClientOptions::new("pk_test")
            .api_url(mock_server.uri())
            .refresh_path("/custom/refresh"),
    )
    .expect("client");
    client.authenticate_with_token("expired", "u1", "ref-1");

    let body = client
        .api()
        .get("/api/v1/conversations")
        .await
        .expect("request")
        .expect("JSON object body");

    assert_eq!(body["items"], json!([]));
    assert_eq!(client.access_token().as_deref(), Some("fresh"));
}

#[tokio::test]
async fn test_connect_uses_session_token() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let uri = Arc::new(Mutex::new(None::<String>));
    let server_uri = uri.clone();
    tokio::spawn(async move {
        let Ok((tcp, _)) = listener.accept().await else {
            return;
        };
        let record_uri = |request: &Request,
                          response: Response|
         -> Result<Response, ErrorResponse> {
            *server_uri.lock() = Some(request.uri().to_string());
            Ok(response)
        };
        if let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(tcp, record_uri).await {
            while let Some(Ok(_)) = ws.next().await {}
        }
    });

    let client = PaanjClient::new(ClientOptions::new("pk_test").ws_url(format!("ws://{addr}")))
        .expect("client");
    client.authenticate_with_token("acc", "u1", "ref");

    client.connect().await.expect("connect");
    assert!(client.is_connected());
    assert_eq!(uri.lock().as_deref(), Some("/ws?token=acc"));

    client.disconnect();
    assert!(!client.is_connected());

    let err = client.send(&json!({"type": "ping"})).await.unwrap_err();
    assert!(matches!(err, PaanjError::Network(paanj::net::NetworkError::NotConnected)));
}
