//! Integration tests for msf-connect
//!
//! These tests run RemoteRpc and ConnectionManager against an in-process fake
//! of the msgpack RPC endpoint served by axum.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use msf_connect::{
    ConnectError, ConnectSettings, ConnectionManager, Credentials, RemoteRpc,
};
use msf_core_interface::{MsfRpc, RpcError};
use msf_core_resilience::{Invocation, ReconnectPolicy};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct FakeService {
    logins: AtomicUsize,
    calls: AtomicUsize,
    valid_token: Mutex<Option<String>>,
    last_frame: Mutex<Vec<Value>>,
}

impl FakeService {
    fn revoke(&self) {
        *self.valid_token.lock().unwrap() = None;
    }
}

fn reply(status: StatusCode, body: Value) -> axum::response::Response {
    let bytes = rmp_serde::to_vec(&body).unwrap();
    (status, [(header::CONTENT_TYPE, "binary/message-pack")], bytes).into_response()
}

async fn api(State(state): State<Arc<FakeService>>, body: Bytes) -> axum::response::Response {
    let frame: Vec<Value> = rmp_serde::from_slice(&body).unwrap();
    *state.last_frame.lock().unwrap() = frame.clone();
    let method = frame[0].as_str().unwrap_or_default().to_string();

    if method == "auth.login" {
        if frame.get(1) == Some(&json!("msf")) && frame.get(2) == Some(&json!("letmein")) {
            let n = state.logins.fetch_add(1, Ordering::SeqCst) + 1;
            let token = format!("TEMP{n:028}");
            *state.valid_token.lock().unwrap() = Some(token.clone());
            return reply(StatusCode::OK, json!({"result": "success", "token": token}));
        }
        return reply(
            StatusCode::UNAUTHORIZED,
            json!({
                "error": true,
                "error_class": "Msf::RPC::Exception",
                "error_message": "Login Failed",
                "error_code": 401
            }),
        );
    }

    let token = frame.get(1).and_then(Value::as_str).map(str::to_string);
    if token.is_none() || token != *state.valid_token.lock().unwrap() {
        return reply(
            StatusCode::UNAUTHORIZED,
            json!({
                "error": true,
                "error_class": "Msf::RPC::Exception",
                "error_message": "Invalid Authentication Token",
                "error_code": 401
            }),
        );
    }

    state.calls.fetch_add(1, Ordering::SeqCst);
    match method.as_str() {
        "core.version" => reply(
            StatusCode::OK,
            json!({"version": "6.4.0-dev", "ruby": "3.1.2", "api": "1.0"}),
        ),
        "module.execute" => reply(
            StatusCode::OK,
            json!({"job_id": 3, "uuid": "lXg2bQ4c"}),
        ),
        _ => reply(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({
                "error": true,
                "error_class": "ArgumentError",
                "error_message": "Unknown API Call",
                "error_code": 500
            }),
        ),
    }
}

async fn spawn_fake() -> (Arc<FakeService>, u16) {
    let state = Arc::new(FakeService::default());
    let app = Router::new()
        .route("/api/", post(api))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (state, port)
}

fn credentials(port: u16, password: &str) -> Credentials {
    Credentials::new(
        "127.0.0.1",
        port,
        "msf",
        SecretString::from(password.to_string()),
        false,
    )
}

#[tokio::test]
async fn test_login_and_call_carry_token() {
    let (state, port) = spawn_fake().await;
    let creds = credentials(port, "letmein");
    let client = RemoteRpc::build_client(&creds, &ConnectSettings::default()).unwrap();

    let rpc = RemoteRpc::login(client, &creds).await.unwrap();
    assert!(rpc.token().starts_with("TEMP"));

    let version = rpc.call("core.version", vec![]).await.unwrap();
    assert_eq!(version["version"], json!("6.4.0-dev"));

    let frame = state.last_frame.lock().unwrap().clone();
    assert_eq!(frame[0], json!("core.version"));
    assert_eq!(frame[1], json!(rpc.token()));
}

#[tokio::test]
async fn test_wrong_password_is_login_rejected() {
    let (_state, port) = spawn_fake().await;
    let creds = credentials(port, "wrong");
    let client = RemoteRpc::build_client(&creds, &ConnectSettings::default()).unwrap();

    let result = RemoteRpc::login(client, &creds).await;
    assert!(matches!(result, Err(ConnectError::LoginRejected(_))));
}

#[tokio::test]
async fn test_unreachable_service() {
    // Bind then drop to get a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let creds = credentials(port, "letmein");
    let client = RemoteRpc::build_client(&creds, &ConnectSettings::default()).unwrap();
    let result = RemoteRpc::login(client, &creds).await;
    assert!(matches!(result, Err(ConnectError::Unreachable { .. })));
}

#[tokio::test]
async fn test_revoked_token_is_auth_expired() {
    let (state, port) = spawn_fake().await;
    let creds = credentials(port, "letmein");
    let client = RemoteRpc::build_client(&creds, &ConnectSettings::default()).unwrap();
    let rpc = RemoteRpc::login(client, &creds).await.unwrap();

    state.revoke();
    let err = rpc.call("core.version", vec![]).await.unwrap_err();
    assert!(matches!(err, RpcError::AuthExpired(_)));
    assert!(err.is_connection_class());
}

#[tokio::test]
async fn test_remote_error_body() {
    let (_state, port) = spawn_fake().await;
    let creds = credentials(port, "letmein");
    let client = RemoteRpc::build_client(&creds, &ConnectSettings::default()).unwrap();
    let rpc = RemoteRpc::login(client, &creds).await.unwrap();

    match rpc.call("module.bogus", vec![]).await {
        Err(RpcError::Remote { class, message, code }) => {
            assert_eq!(class, "ArgumentError");
            assert_eq!(message, "Unknown API Call");
            assert_eq!(code, Some(500));
        }
        other => panic!("expected remote error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_manager_health_probe_and_reconnect() {
    let (state, port) = spawn_fake().await;
    let manager =
        ConnectionManager::new(credentials(port, "letmein"), &ConnectSettings::default()).unwrap();

    let rpc = manager.acquire().await.unwrap();
    assert!(manager.health_check(&rpc).await);
    assert_eq!(state.logins.load(Ordering::SeqCst), 1);

    state.revoke();
    assert!(!manager.health_check(&rpc).await);

    let fresh = manager.reconnect().await.unwrap();
    assert!(manager.health_check(&fresh).await);
    assert_eq!(state.logins.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_expired_token_costs_exactly_one_relogin() {
    let (state, port) = spawn_fake().await;
    let manager =
        ConnectionManager::new(credentials(port, "letmein"), &ConnectSettings::default()).unwrap();
    manager.acquire().await.unwrap();
    state.revoke();

    let policy = ReconnectPolicy::default();
    let reply = policy
        .execute(
            &manager,
            Invocation::new("execute_module", true),
            |rpc| async move {
                rpc.call(
                    "module.execute",
                    vec![json!("exploit"), json!("multi/handler"), json!({})],
                )
                .await
                .map_err(|e| msf_core_resilience::ResilienceError::AuthExpired(e.to_string()))
            },
        )
        .await
        .unwrap();

    assert_eq!(reply["job_id"], json!(3));
    assert_eq!(state.logins.load(Ordering::SeqCst), 2);
    assert_eq!(manager.stats().reconnects, 1);
}
