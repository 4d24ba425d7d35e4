//! Signer directory: which signer owns which sender address
//!
//! Single-signer mode holds one signer built at startup. Multi-signer mode scans a
//! directory of `<address>.toml` descriptors once and builds each signer on first use.

use super::{Signer, SignerDescriptor, TransactionSigner};
use alloy::primitives::Address;
use eyre::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// A scanned descriptor whose signer is built at most once
pub struct LazySigner {
    path: PathBuf,
    descriptor: SignerDescriptor,
    signer: OnceCell<Arc<Signer>>,
}

pub enum SignerDirectory {
    Single(Arc<Signer>),
    Multi(HashMap<Address, LazySigner>),
}

impl SignerDirectory {
    /// Build the only signer; any failure is fatal to startup
    pub async fn single(descriptor: &SignerDescriptor) -> Result<Self> {
        let signer = Signer::from_descriptor(descriptor)
            .await
            .context("Failed to initialize signer")?;
        tracing::info!("Using {} signer {}", signer.kind(), signer.address());
        Ok(Self::from_signer(signer))
    }

    pub fn from_signer(signer: Signer) -> Self {
        Self::Single(Arc::new(signer))
    }

    /// Scan a descriptor directory without instantiating any signer
    ///
    /// Files that are not `.toml`, whose stem is not an address, or that do not parse are
    /// skipped with a warning.
    pub fn scan(dir: &Path) -> Result<Self> {
        let mut paths = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read signer directory {}", dir.display()))?
            .map(|entry| entry.map(|entry| entry.path()))
            .collect::<std::io::Result<Vec<_>>>()
            .with_context(|| format!("Failed to list signer directory {}", dir.display()))?;
        paths.sort();

        let mut signers = HashMap::new();
        for path in paths {
            if !path.is_file() || path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
                continue;
            }

            let Some(address) = address_from_file_name(&path) else {
                tracing::warn!("Skipping {}: file name is not an address", path.display());
                continue;
            };
            let descriptor = match SignerDescriptor::load(&path) {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    tracing::warn!("Skipping {}: {:#}", path.display(), e);
                    continue;
                }
            };
            if signers.contains_key(&address) {
                tracing::warn!("Skipping {}: duplicate signer for {}", path.display(), address);
                continue;
            }

            signers.insert(
                address,
                LazySigner {
                    path,
                    descriptor,
                    signer: OnceCell::new(),
                },
            );
        }

        tracing::info!(
            "Found {} signer descriptors in {}",
            signers.len(),
            dir.display()
        );
        Ok(Self::Multi(signers))
    }

    /// Every address this directory can sign for, sorted
    pub fn addresses(&self) -> Vec<Address> {
        let mut addresses = match self {
            Self::Single(signer) => vec![signer.address()],
            Self::Multi(signers) => signers.keys().copied().collect(),
        };
        addresses.sort();
        addresses
    }

    /// The signer for `address`, built on first use in multi-signer mode
    ///
    /// `Ok(None)` means no signer is configured for the address. An error means one is
    /// configured but could not be built; the next call tries again.
    pub async fn resolve(&self, address: Address) -> Result<Option<Arc<Signer>>> {
        match self {
            Self::Single(signer) => Ok((signer.address() == address).then(|| signer.clone())),
            Self::Multi(signers) => {
                let Some(entry) = signers.get(&address) else {
                    return Ok(None);
                };

                let signer = entry
                    .signer
                    .get_or_try_init(|| async {
                        let signer = Signer::from_descriptor(&entry.descriptor)
                            .await
                            .with_context(|| {
                                format!("Failed to initialize signer {}", entry.path.display())
                            })?;
                        eyre::ensure!(
                            signer.address() == address,
                            "Signer in {} has address {}",
                            entry.path.display(),
                            signer.address()
                        );
                        tracing::info!("Initialized {} signer {}", signer.kind(), address);
                        Ok::<_, eyre::Report>(Arc::new(signer))
                    })
                    .await?;
                Ok(Some(signer.clone()))
            }
        }
    }
}

fn address_from_file_name(path: &Path) -> Option<Address> {
    let stem = path.file_stem()?.to_str()?;
    let hex = stem
        .strip_prefix("0x")
        .or_else(|| stem.strip_prefix("0X"))
        .unwrap_or(stem);
    if hex.len() != 40 {
        return None;
    }
    hex.parse().ok()
}
