//! Vault-backed signer
//!
//! The private key is read once from a vault secret (`data.data.value`) and then used
//! for local signing, exactly like a decrypted keystore.

use super::descriptor::read_secret;
use super::{sign_with_local_key, Signature, TransactionSigner, VaultDescriptor};
use alloy::primitives::{hex, Address, B256};
use alloy::signers::local::PrivateKeySigner;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use eyre::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct SecretResponse {
    data: SecretData,
}

#[derive(Debug, Deserialize)]
struct SecretData {
    data: SecretValue,
}

#[derive(Debug, Deserialize)]
struct SecretValue {
    value: String,
}

pub struct VaultSigner {
    key: PrivateKeySigner,
}

impl VaultSigner {
    /// Fetch the signing key from the vault
    ///
    /// Fails on an unreadable token file, a non-200 answer, a timeout or a malformed body.
    pub async fn fetch(descriptor: &VaultDescriptor) -> Result<Self> {
        let token = read_secret(&descriptor.token_file)
            .await
            .context("Failed to read vault token")?;

        let client = Client::builder()
            .timeout(Duration::from_millis(descriptor.timeout_ms))
            .build()
            .context("Failed to create HTTP client")?;

        let url = descriptor.secret_url();
        let resp = client
            .get(&url)
            .header("X-Vault-Token", token)
            .send()
            .await
            .with_context(|| format!("Failed to fetch signing key from {}", url))?;

        if resp.status() != StatusCode::OK {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            eyre::bail!("Vault refused signing key request: {} - {}", status, body);
        }

        let secret: SecretResponse = resp
            .json()
            .await
            .context("Failed to parse vault response")?;
        let key = parse_private_key(&secret.data.data.value)?;

        tracing::info!("Loaded vault signer {} from {}", key.address(), url);
        Ok(Self { key })
    }
}

impl TransactionSigner for VaultSigner {
    fn address(&self) -> Address {
        self.key.address()
    }

    async fn sign_hash(&self, digest: B256) -> Result<Signature> {
        sign_with_local_key(&self.key, &digest)
    }
}

/// Accept a 32-byte key as hex (with or without 0x) or base64
fn parse_private_key(value: &str) -> Result<PrivateKeySigner> {
    let value = value.trim();
    let unprefixed = value.strip_prefix("0x").unwrap_or(value);

    let bytes = match hex::decode(unprefixed) {
        Ok(bytes) if bytes.len() == 32 => bytes,
        _ => BASE64
            .decode(value)
            .context("Vault secret is neither hex nor base64")?,
    };

    PrivateKeySigner::from_slice(&bytes).context("Vault secret is not a valid private key")
}
