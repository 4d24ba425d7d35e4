//! In-process HTTP mocks shared by unit tests

use crate::constants::DEFAULT_VAULT_KEY_PATH;
use crate::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use crate::signer::{Signer, VaultDescriptor, VaultSigner};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

pub(crate) async fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

pub(crate) fn serve(listener: TcpListener, router: Router) {
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
}

/// A vault answering `GET {DEFAULT_VAULT_KEY_PATH}` with `secret` for `token`
pub(crate) async fn spawn_vault(secret: &str, token: &str) -> SocketAddr {
    spawn_counting_vault(secret, token).await.0
}

/// [`spawn_vault`], also counting the secret lookups it serves
pub(crate) async fn spawn_counting_vault(secret: &str, token: &str) -> (SocketAddr, Arc<AtomicUsize>) {
    let secret = secret.to_string();
    let token = token.to_string();
    let lookups = Arc::new(AtomicUsize::new(0));
    let counter = lookups.clone();
    let router = Router::new().route(
        DEFAULT_VAULT_KEY_PATH,
        get(move |headers: HeaderMap| {
            let secret = secret.clone();
            let token = token.clone();
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                // slow enough for concurrent callers to overlap
                tokio::time::sleep(Duration::from_millis(20)).await;
                let authorized = headers
                    .get("X-Vault-Token")
                    .and_then(|value| value.to_str().ok())
                    == Some(token.as_str());
                if !authorized {
                    return (StatusCode::FORBIDDEN, Json(json!({"errors": ["permission denied"]})));
                }
                (
                    StatusCode::OK,
                    Json::<Value>(json!({"data": {"data": {"value": secret}}})),
                )
            }
        }),
    );

    let (listener, addr) = bind().await;
    serve(listener, router);
    (addr, lookups)
}

/// A JSON-RPC node answering every call with `result(request)`
pub(crate) async fn spawn_rpc<F>(result: F) -> SocketAddr
where
    F: Fn(&JsonRpcRequest) -> Value + Clone + Send + Sync + 'static,
{
    let router = Router::new().route(
        "/",
        post(move |Json(request): Json<JsonRpcRequest>| {
            let result = result.clone();
            async move {
                let value = result(&request);
                Json(JsonRpcResponse::result(request.response_id(), value))
            }
        }),
    );

    let (listener, addr) = bind().await;
    serve(listener, router);
    addr
}

/// A vault-backed signer for `key`, served by a fresh mock vault
pub(crate) async fn vault_signer(key: &str) -> Signer {
    let vault = spawn_vault(key, "test-token").await;
    let dir = tempfile::tempdir().unwrap();
    let token_file = dir.path().join("token");
    std::fs::write(&token_file, "test-token").unwrap();

    let signer = VaultSigner::fetch(&VaultDescriptor {
        host: "127.0.0.1".to_string(),
        port: vault.port(),
        key_path: DEFAULT_VAULT_KEY_PATH.to_string(),
        token_file,
        timeout_ms: 2_000,
        tls_enabled: false,
    })
    .await
    .unwrap();
    Signer::Vault(signer)
}
