//! Nonce lookups against the downstream node

use crate::error::RequestError;
use crate::jsonrpc::JsonRpcErrorCode;
use alloy::network::Ethereum;
use alloy::primitives::{Address, U256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::transports::{RpcError, TransportError, TransportErrorKind};
use axum::http::StatusCode;
use eyre::{Context, Result};
use reqwest::Url;
use std::future::IntoFuture;
use std::time::Duration;

/// Read-only provider for the downstream node; cheap to clone
pub type ReadProvider = RootProvider<Ethereum>;

/// Connect a read-only provider without fillers
pub fn read_provider(url: &str) -> Result<ReadProvider> {
    let url: Url = url.parse().context("Invalid downstream URL")?;
    Ok(ProviderBuilder::new()
        .disable_recommended_fillers()
        .network::<Ethereum>()
        .connect_http(url))
}

/// Run a node query under `timeout`, mapping transport failures to the proxy's 504 codes
///
/// Any other failure is returned as-is for the caller to classify.
pub(crate) async fn node_call<T>(
    timeout: Duration,
    call: impl IntoFuture<Output = Result<T, TransportError>>,
) -> Result<T, NodeCallError> {
    match tokio::time::timeout(timeout, call).await {
        Err(_) => Err(NodeCallError::Unreachable(RequestError::new(
            StatusCode::GATEWAY_TIMEOUT,
            JsonRpcErrorCode::ConnectionToDownstreamNodeTimedOut,
        ))),
        Ok(Err(e)) => match unreachable_code(&e) {
            Some(code) => Err(NodeCallError::Unreachable(RequestError::new(
                StatusCode::GATEWAY_TIMEOUT,
                code,
            ))),
            None => Err(NodeCallError::Failed(e)),
        },
        Ok(Ok(value)) => Ok(value),
    }
}

#[derive(Debug)]
pub(crate) enum NodeCallError {
    /// The node could not be reached; answered with a 504
    Unreachable(RequestError),
    /// The node answered but the call failed
    Failed(TransportError),
}

fn unreachable_code(error: &TransportError) -> Option<JsonRpcErrorCode> {
    let RpcError::Transport(TransportErrorKind::Custom(source)) = error else {
        return None;
    };
    let source = source.downcast_ref::<reqwest::Error>()?;
    if source.is_timeout() {
        Some(JsonRpcErrorCode::ConnectionToDownstreamNodeTimedOut)
    } else if source.is_connect() {
        Some(JsonRpcErrorCode::FailedToConnectToDownstreamNode)
    } else {
        None
    }
}

/// Looks up the next nonce of a sender, counting pending transactions
#[derive(Clone)]
pub struct NonceProvider {
    provider: ReadProvider,
    timeout: Duration,
}

impl NonceProvider {
    pub fn new(provider: ReadProvider, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// `eth_getTransactionCount(address, "pending")`
    pub async fn next_nonce(&self, address: Address) -> Result<U256, RequestError> {
        let count = node_call(
            self.timeout,
            self.provider.get_transaction_count(address).pending(),
        )
        .await;

        match count {
            Ok(count) => {
                tracing::debug!("Pending nonce of {} is {}", address, count);
                Ok(U256::from(count))
            }
            Err(NodeCallError::Unreachable(e)) => Err(e),
            Err(NodeCallError::Failed(e)) => Err(eyre::Report::new(e)
                .wrap_err(format!("Failed to query nonce of {}", address))
                .into()),
        }
    }
}
