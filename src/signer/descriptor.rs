//! Signer descriptor files
//!
//! A descriptor is a TOML document whose `[signing]` table names a backend and its
//! parameters. Relative paths are resolved against the descriptor's directory.

use crate::constants::{DEFAULT_VAULT_KEY_PATH, DEFAULT_VAULT_TIMEOUT_MS};
use eyre::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum SignerDescriptor {
    #[serde(rename = "file-based-signer")]
    FileKeystore(FileKeystoreDescriptor),
    #[serde(rename = "hashicorp-signer")]
    Vault(VaultDescriptor),
    #[serde(rename = "azure-signer")]
    RemoteHsm(RemoteHsmDescriptor),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FileKeystoreDescriptor {
    pub key_file: PathBuf,
    pub password_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct VaultDescriptor {
    pub host: String,
    #[serde(default = "default_vault_port")]
    pub port: u16,
    #[serde(default = "default_vault_key_path")]
    pub key_path: String,
    pub token_file: PathBuf,
    #[serde(default = "default_vault_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub tls_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RemoteHsmDescriptor {
    pub key_vault_name: String,
    /// First key in the vault when absent
    #[serde(default)]
    pub key_name: Option<String>,
    /// Latest version when absent
    #[serde(default)]
    pub key_version: Option<String>,
    pub client_id: String,
    pub client_secret_file: PathBuf,
    pub tenant_id: String,
    #[serde(default)]
    pub vault_url: Option<String>,
    #[serde(default)]
    pub authority_url: Option<String>,
}

fn default_vault_port() -> u16 {
    8200
}

fn default_vault_key_path() -> String {
    DEFAULT_VAULT_KEY_PATH.to_string()
}

fn default_vault_timeout_ms() -> u64 {
    DEFAULT_VAULT_TIMEOUT_MS
}

#[derive(Deserialize)]
struct DescriptorFile {
    signing: SignerDescriptor,
}

impl SignerDescriptor {
    /// Parse a descriptor document; paths are left as written
    pub fn from_toml(document: &str) -> Result<Self> {
        let file: DescriptorFile =
            toml::from_str(document).context("Invalid signer descriptor")?;
        Ok(file.signing)
    }

    /// Load a descriptor file, resolving relative paths against its directory
    pub fn load(path: &Path) -> Result<Self> {
        let document = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read signer descriptor {}", path.display()))?;
        let mut descriptor = Self::from_toml(&document)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        if let Some(base) = path.parent() {
            descriptor.resolve_paths(base);
        }
        Ok(descriptor)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };

        match self {
            Self::FileKeystore(descriptor) => {
                resolve(&mut descriptor.key_file);
                resolve(&mut descriptor.password_file);
            }
            Self::Vault(descriptor) => resolve(&mut descriptor.token_file),
            Self::RemoteHsm(descriptor) => resolve(&mut descriptor.client_secret_file),
        }
    }
}

impl VaultDescriptor {
    pub fn secret_url(&self) -> String {
        let scheme = if self.tls_enabled { "https" } else { "http" };
        let path = self.key_path.trim_start_matches('/');
        format!("{}://{}:{}/{}", scheme, self.host, self.port, path)
    }
}

/// Read a secret file, trimming surrounding whitespace
pub(crate) async fn read_secret(path: &Path) -> Result<String> {
    let secret = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(secret.trim().to_string())
}
