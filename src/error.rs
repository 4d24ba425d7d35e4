//! Error types for the signing proxy
//!
//! Uses `eyre` for ergonomic error handling with context. Failures that have to reach the
//! caller as a JSON-RPC error body are carried as [`RequestError`].

pub use eyre::{eyre, Context, Report, Result};

use crate::jsonrpc::JsonRpcErrorCode;
use axum::http::StatusCode;

/// A request-scoped failure: the HTTP status and JSON-RPC error code written back to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestError {
    pub status: StatusCode,
    pub code: JsonRpcErrorCode,
}

impl RequestError {
    pub fn new(status: StatusCode, code: JsonRpcErrorCode) -> Self {
        Self { status, code }
    }

    /// 400 with the given code
    pub fn bad_request(code: JsonRpcErrorCode) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code)
    }

    pub fn invalid_params() -> Self {
        Self::bad_request(JsonRpcErrorCode::InvalidParams)
    }

    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            JsonRpcErrorCode::InternalError,
        )
    }
}

impl From<Report> for RequestError {
    /// Unexpected failures are logged with their full chain; the caller only sees the generic code.
    fn from(report: Report) -> Self {
        tracing::error!("Internal error while handling request: {:?}", report);
        Self::internal()
    }
}
