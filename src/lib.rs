//! Transaction-signing JSON-RPC proxy for Ethereum nodes
//!
//! The proxy sits between a JSON-RPC client and a node. It signs `eth_sendTransaction` and
//! `eea_sendTransaction` calls with keys it holds, submits them as raw transactions, answers
//! `eth_accounts` itself and forwards every other call untouched.
//!
//! # Features
//!
//! - Legacy, EIP-155, EEA private and GoQuorum private transaction encoding
//! - Keystore, vault and remote HSM signing backends
//! - One signer, or a directory of signers built on first use
//! - Bounded resubmission when the node reports "nonce too low"
//!
//! # Example
//!
//! ```rust,ignore
//! use ethsign_proxy::{ProxyConfig, SignerDirectory, SignerProxy, SignerSource};
//!
//! #[tokio::main]
//! async fn main() -> eyre::Result<()> {
//!     let config = ProxyConfig::new(SignerSource::Directory("./signers".into()))
//!         .with_downstream_url("http://127.0.0.1:8545")
//!         .with_chain_id(2018);
//!     let directory = SignerDirectory::scan(std::path::Path::new("./signers"))?;
//!
//!     let running = SignerProxy::new(&config, directory)?.start().await?;
//!     tokio::signal::ctrl_c().await?;
//!     running.shutdown(config.shutdown_grace).await
//! }
//! ```

pub mod config;
pub mod constants;
pub mod downstream;
pub mod enclave;
pub mod error;
pub mod handler;
pub mod jsonrpc;
pub mod nonce;
pub mod server;
pub mod signer;
pub mod transaction;

#[cfg(test)]
mod test_utils;

// Re-export main types for convenience
pub use config::{PrivacyMode, ProxyConfig, SignerSource};
pub use error::{eyre, Context, Report, RequestError, Result};
pub use jsonrpc::{JsonRpcErrorCode, JsonRpcId, JsonRpcRequest, JsonRpcResponse};
pub use server::{RunningProxy, SignerProxy};
pub use signer::{Signer, SignerDescriptor, SignerDirectory, TransactionSigner};
pub use transaction::{SendTransactionParams, SignedTransaction, SigningScheme};
