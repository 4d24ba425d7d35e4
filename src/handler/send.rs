//! The send-transaction pipeline
//!
//! Parse the transaction object, resolve the sender's signer and nonce, encode, sign,
//! submit as a raw transaction and resubmit with a fresh nonce while the node reports
//! "nonce too low".

use super::retry::RetryController;
use super::RequestHandler;
use crate::constants::{
    EEA_SEND_RAW_TRANSACTION, ETH_SEND_RAW_PRIVATE_TRANSACTION, ETH_SEND_RAW_TRANSACTION,
    MAX_NONCE_RETRIES,
};
use crate::downstream::DownstreamResponse;
use crate::error::RequestError;
use crate::jsonrpc::{JsonRpcErrorCode, JsonRpcRequest};
use crate::signer::{Signer, TransactionSigner};
use crate::transaction::{
    PrivateFields, SendTransactionParams, SigningScheme, TransactionKind, UnsignedTransaction,
};
use alloy::primitives::{Bytes, U256};
use axum::http::{HeaderMap, StatusCode};
use serde_json::{json, Value};

/// Everything about a submission that stays fixed across retries
struct Submission {
    scheme: SigningScheme,
    method: &'static str,
    privacy: Option<PrivateFields>,
    /// Replaces the caller's `data` (GoQuorum enclave key)
    data: Option<Bytes>,
    /// Second parameter of the raw submission
    options: Option<Value>,
}

impl RequestHandler {
    pub(super) async fn send_transaction(
        &self,
        headers: &HeaderMap,
        request: &JsonRpcRequest,
        eea: bool,
    ) -> Result<DownstreamResponse, RequestError> {
        let params = SendTransactionParams::from_rpc_params(request.params.as_ref())?;
        let kind = params.kind(eea, self.privacy_mode)?;

        let signer = match self.directory.resolve(params.from).await {
            Ok(Some(signer)) => signer,
            Ok(None) => {
                tracing::warn!("No signer for {}", params.from);
                return Err(RequestError::bad_request(
                    JsonRpcErrorCode::SigningFromIsNotAnUnlockedAccount,
                ));
            }
            Err(e) => {
                tracing::error!("Signer for {} is unavailable: {:?}", params.from, e);
                return Err(RequestError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    JsonRpcErrorCode::SignerUnavailable,
                ));
            }
        };

        let submission = self.prepare(&params, kind).await?;

        let mut nonce = match params.nonce {
            Some(nonce) => nonce,
            None => self.nonces.next_nonce(params.from).await?,
        };
        let mut retry = RetryController::new(MAX_NONCE_RETRIES);

        loop {
            let response = self
                .submit(headers, request, &params, &submission, &signer, nonce)
                .await?;
            if !retry.should_retry(&response) {
                return Ok(response);
            }

            nonce = self.nonces.next_nonce(params.from).await?;
            tracing::warn!(
                "Nonce too low for {}, resubmitting with nonce {} (retry {}/{})",
                params.from,
                nonce,
                retry.attempts(),
                MAX_NONCE_RETRIES
            );
        }
    }

    async fn prepare(
        &self,
        params: &SendTransactionParams,
        kind: TransactionKind,
    ) -> Result<Submission, RequestError> {
        let submission = match kind {
            TransactionKind::Public => Submission {
                scheme: self.scheme,
                method: ETH_SEND_RAW_TRANSACTION,
                privacy: None,
                data: None,
                options: None,
            },
            TransactionKind::EeaPrivate(privacy) => Submission {
                scheme: self.scheme,
                method: EEA_SEND_RAW_TRANSACTION,
                privacy: Some(privacy),
                data: None,
                options: None,
            },
            TransactionKind::GoQuorumPrivate {
                private_from,
                private_for,
            } => {
                let payload = params.data.clone().unwrap_or_default();
                let key = self
                    .enclave
                    .store_raw(&payload, private_from.as_deref())
                    .await?;
                Submission {
                    scheme: SigningScheme::GoQuorumPrivate,
                    method: ETH_SEND_RAW_PRIVATE_TRANSACTION,
                    privacy: None,
                    data: Some(key),
                    options: Some(json!({ "privateFor": private_for })),
                }
            }
        };
        Ok(submission)
    }

    async fn submit(
        &self,
        headers: &HeaderMap,
        request: &JsonRpcRequest,
        params: &SendTransactionParams,
        submission: &Submission,
        signer: &Signer,
        nonce: U256,
    ) -> Result<DownstreamResponse, RequestError> {
        let mut fields = params.to_fields(nonce, submission.privacy.clone());
        if let Some(data) = &submission.data {
            fields.data = data.clone();
        }
        let unsigned = UnsignedTransaction {
            sender: params.from,
            fields,
        };

        let digest = unsigned.signing_hash(submission.scheme);
        let signature = signer.sign_hash(digest).await?;
        let signed = unsigned.into_signed(submission.scheme, &signature);

        tracing::debug!(
            "Submitting {} from {} with nonce {} ({})",
            submission.method,
            params.from,
            nonce,
            signed.hash()
        );

        let mut raw_params = vec![Value::String(signed.to_hex())];
        raw_params.extend(submission.options.clone());
        let raw = JsonRpcRequest::new(submission.method, Value::Array(raw_params), request.id.clone());
        Ok(self.downstream.send(headers, &raw).await)
    }
}
