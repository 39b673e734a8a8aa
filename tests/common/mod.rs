//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tether::audit::default_policy;
use tether::auth::users::CredentialStore;
use tether::auth::TokenSigner;
use tether::server::{create_router, AppState};
use tether::storage::MemoryStorage;

pub const TEST_SECRET: &str = "integration-test-secret";

/// Spawn a server on an ephemeral port with in-memory storage.
///
/// `admin` registers with the admin role, everyone else as a plain user.
pub async fn spawn_server(token_ttl: Duration) -> SocketAddr {
    let state = AppState {
        users: CredentialStore::new(Arc::new(MemoryStorage::new())),
        tokens: Arc::new(TokenSigner::new(TEST_SECRET, token_ttl)),
        policy: Arc::new(default_policy()),
        data: Arc::new(MemoryStorage::new()),
        admin_accounts: Arc::new(vec!["admin".to_string()]),
    };

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });

    addr
}

pub fn registration_payload(account: &str, password: &str) -> Value {
    serde_json::json!({
        "name": format!("Test {}", account),
        "email": format!("{}@tether.test", account),
        "phone": "123123123",
        "account": account,
        "password": password,
    })
}

/// Register an account and return its issued token.
pub async fn register(client: &reqwest::Client, addr: SocketAddr, account: &str, password: &str) -> String {
    let resp = client
        .post(format!("http://{}/register", addr))
        .json(&registration_payload(account, password))
        .send()
        .await
        .expect("register request");
    assert_eq!(resp.status(), reqwest::StatusCode::OK, "register {}", account);

    let body: Value = resp.json().await.expect("register body");
    body["token"].as_str().expect("token in response").to_string()
}

/// POST /authorize and return the issued token.
pub async fn authorize(client: &reqwest::Client, addr: SocketAddr, account: &str, password: &str) -> String {
    let resp = client
        .post(format!("http://{}/authorize", addr))
        .json(&serde_json::json!({ "account": account, "password": password }))
        .send()
        .await
        .expect("authorize request");
    assert_eq!(resp.status(), reqwest::StatusCode::OK, "authorize {}", account);

    let body: Value = resp.json().await.expect("authorize body");
    body["token"].as_str().expect("token in response").to_string()
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}
