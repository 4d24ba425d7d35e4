//! Defaults and well-known method names

use std::time::Duration;

/// Gas limit used when the request omits `gas`
pub const DEFAULT_GAS: u64 = 90_000;

/// Gas price used when the request omits `gasPrice`
pub const DEFAULT_GAS_PRICE: u64 = 0;

/// Resends after a "nonce too low" rejection (one submission plus this many retries)
pub const MAX_NONCE_RETRIES: usize = 5;

/// Largest chain id whose EIP-155 `v` (`chainId * 2 + 36`) fits in a `u64`
pub const MAX_CHAIN_ID: u64 = (u64::MAX - 36) / 2;

/// Default downstream request timeout
pub const DEFAULT_DOWNSTREAM_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bounded wait for in-flight requests on shutdown
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Default timeout for vault secret lookups
pub const DEFAULT_VAULT_TIMEOUT_MS: u64 = 10_000;

/// Default vault path of the signing key secret
pub const DEFAULT_VAULT_KEY_PATH: &str = "/v1/secret/data/ethsignerSigningKey";

// JSON-RPC methods handled or emitted by the proxy
pub const ETH_SEND_TRANSACTION: &str = "eth_sendTransaction";
pub const EEA_SEND_TRANSACTION: &str = "eea_sendTransaction";
pub const ETH_ACCOUNTS: &str = "eth_accounts";
pub const ETH_SEND_RAW_TRANSACTION: &str = "eth_sendRawTransaction";
pub const EEA_SEND_RAW_TRANSACTION: &str = "eea_sendRawTransaction";
pub const ETH_SEND_RAW_PRIVATE_TRANSACTION: &str = "eth_sendRawPrivateTransaction";
pub const GOQUORUM_STORE_RAW: &str = "goquorum_storeRaw";
