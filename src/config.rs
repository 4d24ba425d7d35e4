//! Proxy configuration
//!
//! Built from `ETHSIGN_*` environment variables (optionally loaded from `.env` by the binary),
//! or programmatically with the `with_*` builders.

use crate::constants::{DEFAULT_DOWNSTREAM_TIMEOUT, DEFAULT_SHUTDOWN_GRACE, MAX_CHAIN_ID};
use eyre::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_LISTEN_HOST: &str = "127.0.0.1";
const DEFAULT_LISTEN_PORT: u16 = 8545;
const DEFAULT_DOWNSTREAM_URL: &str = "http://127.0.0.1:8590";

/// How a private `eth_sendTransaction` is signed and submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrivacyMode {
    /// Privacy fields are part of the signed transaction (`eea_sendRawTransaction`)
    #[default]
    Eea,
    /// The payload is stored with the enclave first (`eth_sendRawPrivateTransaction`)
    GoQuorum,
}

impl FromStr for PrivacyMode {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "eea" => Ok(Self::Eea),
            "goquorum" => Ok(Self::GoQuorum),
            other => eyre::bail!("Unknown privacy mode: {}", other),
        }
    }
}

/// Where signer descriptors come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerSource {
    /// One descriptor file, built at startup
    File(PathBuf),
    /// A directory of `<address>.toml` descriptors, built on first use
    Directory(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub listen_host: String,
    /// 0 binds an ephemeral port
    pub listen_port: u16,
    /// JSON-RPC endpoint of the downstream node
    pub downstream_url: String,
    pub downstream_timeout: Duration,
    /// `None` signs without replay protection
    pub chain_id: Option<u64>,
    pub privacy_mode: PrivacyMode,
    pub signer_source: SignerSource,
    /// Bounded wait for in-flight requests on shutdown
    pub shutdown_grace: Duration,
}

impl ProxyConfig {
    /// Defaults for everything except the signer source
    pub fn new(signer_source: SignerSource) -> Self {
        Self {
            listen_host: DEFAULT_LISTEN_HOST.to_string(),
            listen_port: DEFAULT_LISTEN_PORT,
            downstream_url: DEFAULT_DOWNSTREAM_URL.to_string(),
            downstream_timeout: DEFAULT_DOWNSTREAM_TIMEOUT,
            chain_id: None,
            privacy_mode: PrivacyMode::default(),
            signer_source,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    /// Read the `ETHSIGN_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let signer_source = match (var("ETHSIGN_SIGNER_FILE"), var("ETHSIGN_SIGNER_DIRECTORY")) {
            (Some(file), None) => SignerSource::File(file.into()),
            (None, Some(dir)) => SignerSource::Directory(dir.into()),
            (Some(_), Some(_)) => {
                eyre::bail!("ETHSIGN_SIGNER_FILE and ETHSIGN_SIGNER_DIRECTORY are mutually exclusive")
            }
            (None, None) => {
                eyre::bail!("One of ETHSIGN_SIGNER_FILE or ETHSIGN_SIGNER_DIRECTORY must be set")
            }
        };

        let mut config = Self::new(signer_source);
        if let Some(host) = var("ETHSIGN_HTTP_LISTEN_HOST") {
            config.listen_host = host;
        }
        if let Some(port) = var("ETHSIGN_HTTP_LISTEN_PORT") {
            config.listen_port = parse("ETHSIGN_HTTP_LISTEN_PORT", &port)?;
        }
        if let Some(url) = var("ETHSIGN_DOWNSTREAM_URL") {
            reqwest::Url::parse(&url)
                .with_context(|| format!("Invalid ETHSIGN_DOWNSTREAM_URL: {}", url))?;
            config.downstream_url = url;
        }
        if let Some(ms) = var("ETHSIGN_DOWNSTREAM_TIMEOUT_MS") {
            config.downstream_timeout =
                Duration::from_millis(parse("ETHSIGN_DOWNSTREAM_TIMEOUT_MS", &ms)?);
        }
        if let Some(chain_id) = var("ETHSIGN_CHAIN_ID") {
            config.chain_id = Some(parse("ETHSIGN_CHAIN_ID", &chain_id)?);
        }
        if let Some(mode) = var("ETHSIGN_PRIVACY_MODE") {
            config.privacy_mode = mode.parse()?;
        }
        if let Some(ms) = var("ETHSIGN_SHUTDOWN_GRACE_MS") {
            config.shutdown_grace = Duration::from_millis(parse("ETHSIGN_SHUTDOWN_GRACE_MS", &ms)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the proxy cannot sign with
    pub fn validate(&self) -> Result<()> {
        if let Some(chain_id) = self.chain_id {
            eyre::ensure!(
                chain_id <= MAX_CHAIN_ID,
                "Chain id {} is too large (max {})",
                chain_id,
                MAX_CHAIN_ID
            );
        }
        Ok(())
    }

    /// Address the listener binds to
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }

    pub fn with_listen_port(mut self, port: u16) -> Self {
        self.listen_port = port;
        self
    }

    pub fn with_downstream_url(mut self, url: impl Into<String>) -> Self {
        self.downstream_url = url.into();
        self
    }

    pub fn with_downstream_timeout(mut self, timeout: Duration) -> Self {
        self.downstream_timeout = timeout;
        self
    }

    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    pub fn with_privacy_mode(mut self, mode: PrivacyMode) -> Self {
        self.privacy_mode = mode;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}

fn parse<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid {}: {}", name, value))
}
