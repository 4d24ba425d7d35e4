//! Request handling
//!
//! Every inbound body goes through [`RequestHandler::handle`], which never fails: malformed
//! requests, request-scoped errors and panics all become JSON-RPC error responses.

mod accounts;
mod retry;
mod route;
mod send;

pub use retry::{is_nonce_too_low, RetryController, RetryState};
pub use route::Route;

use crate::config::{PrivacyMode, ProxyConfig};
use crate::downstream::{Downstream, DownstreamResponse};
use crate::enclave::EnclaveClient;
use crate::jsonrpc::{JsonRpcErrorCode, JsonRpcId, JsonRpcRequest};
use crate::nonce::{read_provider, NonceProvider};
use crate::signer::SignerDirectory;
use crate::transaction::SigningScheme;
use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use eyre::Result;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

pub struct RequestHandler {
    directory: Arc<SignerDirectory>,
    downstream: Downstream,
    nonces: NonceProvider,
    enclave: EnclaveClient,
    scheme: SigningScheme,
    privacy_mode: PrivacyMode,
}

impl RequestHandler {
    pub fn new(config: &ProxyConfig, directory: Arc<SignerDirectory>) -> Result<Self> {
        let provider = read_provider(&config.downstream_url)?;

        Ok(Self {
            directory,
            downstream: Downstream::new(&config.downstream_url, config.downstream_timeout)?,
            nonces: NonceProvider::new(provider.clone(), config.downstream_timeout),
            enclave: EnclaveClient::new(provider, config.downstream_timeout),
            scheme: SigningScheme::from_chain_id(config.chain_id),
            privacy_mode: config.privacy_mode,
        })
    }

    /// Handle one request body
    pub async fn handle(&self, headers: HeaderMap, body: Bytes) -> DownstreamResponse {
        let request = match JsonRpcRequest::parse(&body) {
            Ok(request) => request,
            Err(rejected) => {
                tracing::warn!("Rejected malformed request: {:?}", rejected.code);
                return DownstreamResponse::error(StatusCode::BAD_REQUEST, rejected.id, rejected.code);
            }
        };

        let id = request.response_id();
        tracing::debug!("Received {} (id {:?})", request.method, id);
        catch_panic(id.clone(), self.dispatch(&headers, &request, id, body)).await
    }

    async fn dispatch(
        &self,
        headers: &HeaderMap,
        request: &JsonRpcRequest,
        id: JsonRpcId,
        body: Bytes,
    ) -> DownstreamResponse {
        let result = match Route::of(&request.method) {
            Route::Accounts => {
                accounts::accounts(&self.directory, request).map(DownstreamResponse::local)
            }
            Route::SendTransaction { eea } => self.send_transaction(headers, request, eea).await,
            Route::PassThrough => Ok(self.downstream.forward(headers, body, id.clone()).await),
        };

        result.unwrap_or_else(|e| {
            tracing::debug!("{} failed with {:?}", request.method, e.code);
            DownstreamResponse::error(e.status, id, e.code)
        })
    }
}

/// Run a request to completion, turning a panic into a 500 for the same id
async fn catch_panic<F>(id: JsonRpcId, request: F) -> DownstreamResponse
where
    F: Future<Output = DownstreamResponse>,
{
    match AssertUnwindSafe(request).catch_unwind().await {
        Ok(response) => response,
        Err(_) => {
            tracing::error!("Request handler panicked (id {:?})", id);
            DownstreamResponse::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                id,
                JsonRpcErrorCode::InternalError,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corrupted_signer() -> DownstreamResponse {
        panic!("keystore handle poisoned at 0x7e5f4552")
    }

    #[tokio::test]
    async fn test_panic_becomes_internal_error() {
        let response = catch_panic(JsonRpcId::from(41), async { corrupted_signer() }).await;
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);

        let body = String::from_utf8(response.body.to_vec()).unwrap();
        assert!(!body.contains("poisoned"));
        assert!(!body.contains("0x7e5f4552"));

        let parsed = response.json().unwrap();
        assert_eq!(parsed.id, JsonRpcId::from(41));
        assert_eq!(
            parsed.error_code(),
            Some(JsonRpcErrorCode::InternalError.code())
        );
    }

    #[tokio::test]
    async fn test_completed_request_passes_through() {
        let response = catch_panic(JsonRpcId::from(1), async {
            DownstreamResponse::error(
                StatusCode::BAD_REQUEST,
                JsonRpcId::from(1),
                JsonRpcErrorCode::InvalidParams,
            )
        })
        .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
    }
}
