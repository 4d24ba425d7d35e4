//! Method routing

use crate::constants::{EEA_SEND_TRANSACTION, ETH_ACCOUNTS, ETH_SEND_TRANSACTION};

/// Where an inbound call is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Signed locally and submitted as a raw transaction
    SendTransaction { eea: bool },
    /// Answered from the signer directory
    Accounts,
    /// Forwarded to the downstream node untouched
    PassThrough,
}

impl Route {
    pub fn of(method: &str) -> Self {
        match method {
            ETH_SEND_TRANSACTION => Self::SendTransaction { eea: false },
            EEA_SEND_TRANSACTION => Self::SendTransaction { eea: true },
            ETH_ACCOUNTS => Self::Accounts,
            _ => Self::PassThrough,
        }
    }
}
