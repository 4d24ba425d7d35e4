//! Encrypted keystore file signer

use super::{sign_with_local_key, Signature, TransactionSigner};
use alloy::primitives::{Address, B256};
use alloy::signers::local::PrivateKeySigner;
use eyre::{Context, Result};
use std::path::Path;

/// Signer backed by an encrypted JSON keystore
///
/// The key is decrypted once; address derivation and signing are local from then on.
pub struct FileKeystoreSigner {
    key: PrivateKeySigner,
}

impl FileKeystoreSigner {
    /// Decrypt a keystore file with its password
    ///
    /// Blocking: key derivation is deliberately slow.
    pub fn decrypt(key_file: &Path, password: impl AsRef<[u8]>) -> Result<Self> {
        let key = PrivateKeySigner::decrypt_keystore(key_file, password)
            .with_context(|| format!("Failed to decrypt keystore {}", key_file.display()))?;

        tracing::info!(
            "Loaded keystore signer {} from {}",
            key.address(),
            key_file.display()
        );
        Ok(Self { key })
    }
}

impl TransactionSigner for FileKeystoreSigner {
    fn address(&self) -> Address {
        self.key.address()
    }

    async fn sign_hash(&self, digest: B256) -> Result<Signature> {
        sign_with_local_key(&self.key, &digest)
    }
}
