//! `eth_sendTransaction` / `eea_sendTransaction` parameters

use super::{PrivateFields, Restriction, TransactionFields};
use crate::config::PrivacyMode;
use crate::constants::{DEFAULT_GAS, DEFAULT_GAS_PRICE};
use crate::error::RequestError;
use alloy::primitives::{Address, Bytes, U256};
use serde::Deserialize;
use serde_json::Value;

/// The transaction object of a send-transaction call
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTransactionParams {
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub gas: Option<U256>,
    #[serde(default)]
    pub gas_price: Option<U256>,
    #[serde(default)]
    pub nonce: Option<U256>,
    #[serde(default)]
    pub value: Option<U256>,
    #[serde(default, alias = "input")]
    pub data: Option<Bytes>,
    #[serde(default)]
    pub private_from: Option<String>,
    #[serde(default)]
    pub private_for: Option<Vec<String>>,
    #[serde(default)]
    pub privacy_group_id: Option<String>,
    #[serde(default)]
    pub restriction: Option<Restriction>,
}

/// How a send-transaction call is encoded and submitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionKind {
    Public,
    EeaPrivate(PrivateFields),
    GoQuorumPrivate {
        private_from: Option<String>,
        private_for: Vec<String>,
    },
}

impl SendTransactionParams {
    /// Extract the single transaction object from JSON-RPC `params`
    pub fn from_rpc_params(params: Option<&Value>) -> Result<Self, RequestError> {
        let object = match params {
            Some(Value::Array(items)) if items.len() == 1 => &items[0],
            _ => return Err(RequestError::invalid_params()),
        };

        serde_json::from_value(object.clone()).map_err(|e| {
            tracing::debug!("Rejecting transaction params: {}", e);
            RequestError::invalid_params()
        })
    }

    fn has_privacy_fields(&self) -> bool {
        self.private_from.is_some() || self.private_for.is_some() || self.privacy_group_id.is_some()
    }

    /// Decide the transaction kind for the calling method and privacy mode
    ///
    /// `eea_sendTransaction` must carry the privacy fields. A plain `eth_sendTransaction`
    /// becomes private when it carries them; a partial set is rejected rather than sent
    /// publicly.
    pub fn kind(&self, eea_method: bool, mode: PrivacyMode) -> Result<TransactionKind, RequestError> {
        if !eea_method && !self.has_privacy_fields() {
            return Ok(TransactionKind::Public);
        }

        if !eea_method && mode == PrivacyMode::GoQuorum {
            return match &self.private_for {
                Some(private_for) if !private_for.is_empty() && self.privacy_group_id.is_none() => {
                    Ok(TransactionKind::GoQuorumPrivate {
                        private_from: self.private_from.clone(),
                        private_for: private_for.clone(),
                    })
                }
                _ => Err(RequestError::invalid_params()),
            };
        }

        let private_from = self
            .private_from
            .as_deref()
            .ok_or_else(RequestError::invalid_params)?;

        let fields = PrivateFields::parse(
            private_from,
            self.private_for.as_deref(),
            self.privacy_group_id.as_deref(),
            self.restriction.unwrap_or_default(),
        )
        .map_err(|e| {
            tracing::debug!("Rejecting privacy params: {:#}", e);
            RequestError::invalid_params()
        })?;

        Ok(TransactionKind::EeaPrivate(fields))
    }

    /// Transaction fields with request defaults applied and the resolved nonce
    pub fn to_fields(&self, nonce: U256, privacy: Option<PrivateFields>) -> TransactionFields {
        TransactionFields {
            nonce,
            gas_price: self.gas_price.unwrap_or(U256::from(DEFAULT_GAS_PRICE)),
            gas: self.gas.unwrap_or(U256::from(DEFAULT_GAS)),
            to: self.to,
            value: self.value.unwrap_or(U256::ZERO),
            data: self.data.clone().unwrap_or_default(),
            privacy,
        }
    }
}
