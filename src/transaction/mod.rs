//! Transaction model and canonical encoding
//!
//! A send-transaction call is parsed into [`SendTransactionParams`], turned into an
//! [`UnsignedTransaction`] once the nonce is known, hashed under a [`SigningScheme`] and
//! finally re-encoded with the signature as a [`SignedTransaction`].

mod encoding;
mod params;
mod private;

pub use encoding::{SignedTransaction, SigningScheme};
pub use params::{SendTransactionParams, TransactionKind};
pub use private::{decode_enclave_key, PrivateFields, PrivateRecipients, Restriction};

use alloy::primitives::{Address, Bytes, U256};

/// The encoded fields of a transaction, in RLP order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionFields {
    pub nonce: U256,
    pub gas_price: U256,
    pub gas: U256,
    /// `None` for contract creation
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
    /// Present for EEA private transactions
    pub privacy: Option<PrivateFields>,
}

/// A transaction ready to be hashed and signed on behalf of `sender`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub sender: Address,
    pub fields: TransactionFields,
}
