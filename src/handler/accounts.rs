//! `eth_accounts`, answered without contacting the node

use crate::error::RequestError;
use crate::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use crate::signer::SignerDirectory;
use serde_json::Value;

/// Lower-case addresses of every configured signer, sorted
pub(super) fn accounts(
    directory: &SignerDirectory,
    request: &JsonRpcRequest,
) -> Result<JsonRpcResponse, RequestError> {
    let no_params = match &request.params {
        None | Some(Value::Null) => true,
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    };
    if !no_params {
        return Err(RequestError::invalid_params());
    }

    let accounts: Vec<Value> = directory
        .addresses()
        .into_iter()
        .map(|address| Value::String(format!("{:#x}", address)))
        .collect();
    Ok(JsonRpcResponse::result(
        request.response_id(),
        Value::Array(accounts),
    ))
}
