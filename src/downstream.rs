//! Downstream transmitter
//!
//! Forwards JSON-RPC bodies to the node and hands back its status and body untouched.
//! Transport failures never surface as errors: they become synthesized 504 responses.
//!
//! Connection-level headers are not forwarded and the node is always asked for an
//! identity-encoded body, so the proxy can read every response it relays.

use crate::jsonrpc::{JsonRpcErrorCode, JsonRpcId, JsonRpcRequest, JsonRpcResponse};
use axum::body::Bytes;
use axum::http::header::{
    ACCEPT_ENCODING, CONNECTION, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, HOST, ORIGIN, TE,
    TRANSFER_ENCODING, UPGRADE,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use eyre::{Context, Result};
use reqwest::{Client, Url};
use std::time::Duration;

const X_FORWARDED_HOST: &str = "x-forwarded-host";
const KEEP_ALIVE: &str = "keep-alive";

/// A downstream answer, or the error response standing in for one
#[derive(Debug, Clone)]
pub struct DownstreamResponse {
    pub status: StatusCode,
    pub body: Bytes,
    /// Replayed to the caller when the node encoded the body anyway
    pub content_encoding: Option<HeaderValue>,
}

impl DownstreamResponse {
    /// A proxy-generated JSON-RPC error
    pub fn error(status: StatusCode, id: JsonRpcId, code: JsonRpcErrorCode) -> Self {
        let body = serde_json::to_vec(&JsonRpcResponse::error(id, code)).unwrap_or_default();
        Self {
            status,
            body: body.into(),
            content_encoding: None,
        }
    }

    /// A response produced by the proxy without contacting the node
    pub fn local(response: JsonRpcResponse) -> Self {
        let body = serde_json::to_vec(&response).unwrap_or_default();
        Self {
            status: StatusCode::OK,
            body: body.into(),
            content_encoding: None,
        }
    }

    /// The body as a JSON-RPC response, if it is one
    pub fn json(&self) -> Option<JsonRpcResponse> {
        serde_json::from_slice(&self.body).ok()
    }
}

impl IntoResponse for DownstreamResponse {
    fn into_response(self) -> Response {
        let mut response = (
            self.status,
            [(CONTENT_TYPE, HeaderValue::from_static("application/json"))],
            self.body,
        )
            .into_response();
        if let Some(encoding) = self.content_encoding {
            response.headers_mut().insert(CONTENT_ENCODING, encoding);
        }
        response
    }
}

#[derive(Clone)]
pub struct Downstream {
    client: Client,
    url: Url,
}

impl Downstream {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url: Url = url.parse().context("Invalid downstream URL")?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client, url })
    }

    /// Forward an inbound body as received
    pub async fn forward(&self, headers: &HeaderMap, body: Bytes, id: JsonRpcId) -> DownstreamResponse {
        self.post(forwarded_headers(headers), body, id).await
    }

    /// Send a request built by the proxy
    pub async fn send(&self, headers: &HeaderMap, request: &JsonRpcRequest) -> DownstreamResponse {
        let id = request.response_id();
        let body = match serde_json::to_vec(request) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!("Failed to serialize downstream request: {}", e);
                return DownstreamResponse::error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    id,
                    JsonRpcErrorCode::InternalError,
                );
            }
        };

        let mut headers = forwarded_headers(headers);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.post(headers, body.into(), id).await
    }

    async fn post(&self, headers: HeaderMap, body: Bytes, id: JsonRpcId) -> DownstreamResponse {
        let result = async {
            let resp = self
                .client
                .post(self.url.clone())
                .headers(headers)
                .body(body)
                .send()
                .await?;
            let status = resp.status();
            let content_encoding = resp
                .headers()
                .get(CONTENT_ENCODING)
                .filter(|encoding| *encoding != "identity")
                .cloned();
            let body = resp.bytes().await?;
            Ok::<_, reqwest::Error>(DownstreamResponse {
                status,
                body,
                content_encoding,
            })
        }
        .await;

        match result {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                tracing::warn!("Downstream node timed out: {}", e);
                DownstreamResponse::error(
                    StatusCode::GATEWAY_TIMEOUT,
                    id,
                    JsonRpcErrorCode::ConnectionToDownstreamNodeTimedOut,
                )
            }
            Err(e) => {
                tracing::warn!("Failed to reach downstream node: {}", e);
                DownstreamResponse::error(
                    StatusCode::GATEWAY_TIMEOUT,
                    id,
                    JsonRpcErrorCode::FailedToConnectToDownstreamNode,
                )
            }
        }
    }
}

/// Inbound headers minus `Content-Length`, `Origin`, `Host` and the hop-by-hop set
///
/// The host moves to `X-Forwarded-Host` and the body is requested without compression.
fn forwarded_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = inbound.clone();
    for name in [CONTENT_LENGTH, ORIGIN, CONNECTION, TRANSFER_ENCODING, TE, UPGRADE] {
        headers.remove(name);
    }
    headers.remove(KEEP_ALIVE);
    if let Some(host) = headers.remove(HOST) {
        headers.insert(HeaderName::from_static(X_FORWARDED_HOST), host);
    }
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
    headers
}
