//! Transaction signer abstraction
//!
//! This module provides a trait-based abstraction over the signing backends the proxy can
//! hold keys in:
//! - `FileKeystoreSigner`: an encrypted JSON keystore decrypted once at startup
//! - `VaultSigner`: a private key fetched from a vault secret at startup
//! - `RemoteHsmSigner`: a key that never leaves a remote HSM
//!
//! The set is closed, so backends are dispatched through the [`Signer`] enum.

mod descriptor;
mod directory;
mod file;
mod hsm;
mod vault;

pub use descriptor::{
    FileKeystoreDescriptor, RemoteHsmDescriptor, SignerDescriptor, VaultDescriptor,
};
pub use directory::SignerDirectory;
pub use file::FileKeystoreSigner;
pub use hsm::RemoteHsmSigner;
pub use vault::VaultSigner;

use alloy::primitives::{Address, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use eyre::{Context, Result};

/// A raw backend signature over a 32-byte digest
///
/// `v` follows the backend's convention: local keys report `27 + parity`, the HSM reports
/// the recovery id it found. [`Signature::recovery_parity`] normalizes both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub v: u64,
    pub r: U256,
    pub s: U256,
}

impl Signature {
    /// The 0/1 y-parity, whichever convention `v` is in
    pub fn recovery_parity(&self) -> u8 {
        let recovery_id = if self.v >= 27 { self.v - 27 } else { self.v };
        (recovery_id & 1) as u8
    }
}

impl From<alloy::primitives::Signature> for Signature {
    fn from(signature: alloy::primitives::Signature) -> Self {
        Self {
            v: 27 + u64::from(signature.v()),
            r: signature.r(),
            s: signature.s(),
        }
    }
}

/// Trait for anything that can sign transaction digests for one address
pub trait TransactionSigner: Send + Sync {
    /// Returns the signer's EVM address
    fn address(&self) -> Address;

    /// Signs a 32-byte digest
    fn sign_hash(&self, digest: B256)
        -> impl std::future::Future<Output = Result<Signature>> + Send;
}

/// Local ECDSA shared by the keystore and vault backends
fn sign_with_local_key(key: &PrivateKeySigner, digest: &B256) -> Result<Signature> {
    let signature = key
        .sign_hash_sync(digest)
        .context("Local signing failed")?;
    Ok(signature.into())
}

/// One configured signing backend
pub enum Signer {
    FileKeystore(FileKeystoreSigner),
    Vault(VaultSigner),
    RemoteHsm(RemoteHsmSigner),
}

impl Signer {
    /// Instantiate the backend a descriptor names
    ///
    /// Keystore decryption is CPU bound and runs on the blocking pool.
    pub async fn from_descriptor(descriptor: &SignerDescriptor) -> Result<Self> {
        match descriptor {
            SignerDescriptor::FileKeystore(descriptor) => {
                let password = descriptor::read_secret(&descriptor.password_file)
                    .await
                    .context("Failed to read keystore password")?;
                let key_file = descriptor.key_file.clone();
                let signer = tokio::task::spawn_blocking(move || {
                    FileKeystoreSigner::decrypt(&key_file, password)
                })
                .await
                .context("Keystore decryption task failed")??;
                Ok(Self::FileKeystore(signer))
            }
            SignerDescriptor::Vault(descriptor) => {
                Ok(Self::Vault(VaultSigner::fetch(descriptor).await?))
            }
            SignerDescriptor::RemoteHsm(descriptor) => {
                Ok(Self::RemoteHsm(RemoteHsmSigner::connect(descriptor).await?))
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::FileKeystore(_) => "file-keystore",
            Self::Vault(_) => "vault",
            Self::RemoteHsm(_) => "remote-hsm",
        }
    }
}

impl TransactionSigner for Signer {
    fn address(&self) -> Address {
        match self {
            Self::FileKeystore(signer) => signer.address(),
            Self::Vault(signer) => signer.address(),
            Self::RemoteHsm(signer) => signer.address(),
        }
    }

    async fn sign_hash(&self, digest: B256) -> Result<Signature> {
        match self {
            Self::FileKeystore(signer) => signer.sign_hash(digest).await,
            Self::Vault(signer) => signer.sign_hash(digest).await,
            Self::RemoteHsm(signer) => signer.sign_hash(digest).await,
        }
    }
}
