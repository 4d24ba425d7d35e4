//! GoQuorum private payload storage
//!
//! A GoQuorum private transaction carries the enclave key of its payload instead of the
//! payload itself. The node stores the payload with `goquorum_storeRaw` and returns that key.

use crate::constants::GOQUORUM_STORE_RAW;
use crate::error::RequestError;
use crate::jsonrpc::JsonRpcErrorCode;
use crate::nonce::{node_call, NodeCallError, ReadProvider};
use alloy::primitives::Bytes;
use alloy::providers::Provider;
use axum::http::StatusCode;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::time::Duration;

#[derive(Clone)]
pub struct EnclaveClient {
    provider: ReadProvider,
    timeout: Duration,
}

impl EnclaveClient {
    pub fn new(provider: ReadProvider, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Store `payload` and return the enclave key that replaces it in the transaction
    pub async fn store_raw(
        &self,
        payload: &Bytes,
        private_from: Option<&str>,
    ) -> Result<Bytes, RequestError> {
        let mut params = vec![BASE64.encode(payload)];
        params.extend(private_from.map(str::to_string));

        let stored = node_call(
            self.timeout,
            self.provider
                .raw_request::<_, Bytes>(GOQUORUM_STORE_RAW.into(), params),
        )
        .await;

        match stored {
            Ok(key) if !key.is_empty() => {
                tracing::debug!("Stored private payload of {} bytes", payload.len());
                Ok(key)
            }
            Ok(_) => {
                tracing::warn!("Enclave returned an empty key");
                Err(store_failed())
            }
            Err(NodeCallError::Unreachable(e)) => Err(e),
            Err(NodeCallError::Failed(e)) => {
                tracing::warn!("Failed to store private payload: {}", e);
                Err(store_failed())
            }
        }
    }
}

fn store_failed() -> RequestError {
    RequestError::new(StatusCode::BAD_GATEWAY, JsonRpcErrorCode::EnclaveStoreFailed)
}
