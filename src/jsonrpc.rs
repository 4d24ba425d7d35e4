//! JSON-RPC 2.0 envelopes and the error codes the proxy emits

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// Request identifier, echoed verbatim in the matching response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcId {
    Number(serde_json::Number),
    String(String),
    #[default]
    Null,
}

impl From<u64> for JsonRpcId {
    fn from(id: u64) -> Self {
        Self::Number(id.into())
    }
}

/// Inbound or outbound JSON-RPC request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// `None` for a notification; `Some(JsonRpcId::Null)` when the caller sent `"id": null`
    #[serde(
        default,
        deserialize_with = "deserialize_present_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<JsonRpcId>,
}

fn deserialize_present_id<'de, D>(deserializer: D) -> Result<Option<JsonRpcId>, D::Error>
where
    D: Deserializer<'de>,
{
    JsonRpcId::deserialize(deserializer).map(Some)
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: Value, id: Option<JsonRpcId>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params: Some(params),
            id,
        }
    }

    /// The id to put on a response; notifications are answered with `null`
    pub fn response_id(&self) -> JsonRpcId {
        self.id.clone().unwrap_or_default()
    }

    /// Parse a request body, classifying failures as `PARSE_ERROR` or `INVALID_REQUEST`
    pub fn parse(body: &[u8]) -> Result<Self, RejectedRequest> {
        let value: Value = serde_json::from_slice(body).map_err(|_| RejectedRequest {
            id: JsonRpcId::Null,
            code: JsonRpcErrorCode::ParseError,
        })?;

        // Best effort, so that an invalid request still echoes the caller's id
        let id = value
            .get("id")
            .and_then(|id| serde_json::from_value(id.clone()).ok())
            .unwrap_or_default();

        if !value.is_object() {
            return Err(RejectedRequest {
                id,
                code: JsonRpcErrorCode::InvalidRequest,
            });
        }

        serde_json::from_value(value).map_err(|_| RejectedRequest {
            id,
            code: JsonRpcErrorCode::InvalidRequest,
        })
    }
}

/// A body rejected before any handler ran
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRequest {
    pub id: JsonRpcId,
    pub code: JsonRpcErrorCode,
}

/// JSON-RPC response; exactly one of `result` / `error` is present
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: JsonRpcId,
    #[serde(flatten)]
    pub payload: JsonRpcPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JsonRpcPayload {
    Result(Value),
    Error(JsonRpcErrorBody),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorBody {
    pub code: i64,
    pub message: String,
}

impl JsonRpcResponse {
    pub fn result(id: JsonRpcId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            payload: JsonRpcPayload::Result(result),
        }
    }

    pub fn error(id: JsonRpcId, code: JsonRpcErrorCode) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            payload: JsonRpcPayload::Error(JsonRpcErrorBody {
                code: code.code(),
                message: code.message().to_string(),
            }),
        }
    }

    pub fn error_code(&self) -> Option<i64> {
        match &self.payload {
            JsonRpcPayload::Error(error) => Some(error.code),
            JsonRpcPayload::Result(_) => None,
        }
    }
}

/// Error codes written by the proxy itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonRpcErrorCode {
    ParseError,
    InvalidRequest,
    InvalidParams,
    InternalError,
    SigningFromIsNotAnUnlockedAccount,
    NonceTooLow,
    ConnectionToDownstreamNodeTimedOut,
    FailedToConnectToDownstreamNode,
    SignerUnavailable,
    EnclaveStoreFailed,
}

impl JsonRpcErrorCode {
    pub const fn code(self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::SigningFromIsNotAnUnlockedAccount => -32000,
            Self::NonceTooLow => -32001,
            Self::ConnectionToDownstreamNodeTimedOut => -32100,
            Self::FailedToConnectToDownstreamNode => -32101,
            Self::SignerUnavailable => -32102,
            Self::EnclaveStoreFailed => -32103,
        }
    }

    pub const fn message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::SigningFromIsNotAnUnlockedAccount => "From address is not an unlocked account",
            Self::NonceTooLow => "Nonce too low",
            Self::ConnectionToDownstreamNodeTimedOut => "Connection to downstream node timed out",
            Self::FailedToConnectToDownstreamNode => "Failed to connect to downstream node",
            Self::SignerUnavailable => "Signer for from address is unavailable",
            Self::EnclaveStoreFailed => "Failed to store private payload in enclave",
        }
    }
}
