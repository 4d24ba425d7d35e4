//! Remote HSM signer (Azure Key Vault style API)
//!
//! The private key never leaves the remote service. The service signs a digest and
//! returns only `(r, s)`, so the recovery id is found locally by trying every candidate
//! against the public key fetched at construction.

use super::descriptor::read_secret;
use super::{RemoteHsmDescriptor, Signature, TransactionSigner};
use alloy::primitives::{keccak256, Address, B256, U256};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64_URL, Engine};
use eyre::{Context, Result};
use k256::ecdsa::{RecoveryId, VerifyingKey};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const DEFAULT_AUTHORITY_URL: &str = "https://login.microsoftonline.com";
const VAULT_SCOPE: &str = "https://vault.azure.net/.default";
const API_VERSION: &str = "7.4";
const SIGNING_ALGORITHM: &str = "ES256K";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Tokens are refreshed this long before they expire
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

// ========== API Request/Response Types ==========

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct KeyBundle {
    key: JsonWebKey,
}

#[derive(Debug, Deserialize)]
struct JsonWebKey {
    kid: String,
    kty: String,
    #[serde(default)]
    crv: Option<String>,
    x: String,
    y: String,
}

#[derive(Debug, Deserialize)]
struct KeyList {
    value: Vec<KeyItem>,
}

#[derive(Debug, Deserialize)]
struct KeyItem {
    kid: String,
}

#[derive(Debug, Serialize)]
struct SignRequest<'a> {
    alg: &'a str,
    value: String,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    value: String,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Authenticated client for one key vault
struct KeyVaultClient {
    http: Client,
    vault_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
}

impl KeyVaultClient {
    fn new(descriptor: &RemoteHsmDescriptor, client_secret: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        let vault_url = descriptor
            .vault_url
            .clone()
            .unwrap_or_else(|| format!("https://{}.vault.azure.net", descriptor.key_vault_name));
        let authority = descriptor
            .authority_url
            .as_deref()
            .unwrap_or(DEFAULT_AUTHORITY_URL);
        let token_url = format!(
            "{}/{}/oauth2/v2.0/token",
            authority.trim_end_matches('/'),
            descriptor.tenant_id
        );

        Ok(Self {
            http,
            vault_url: vault_url.trim_end_matches('/').to_string(),
            token_url,
            client_id: descriptor.client_id.clone(),
            client_secret,
            token: Mutex::new(None),
        })
    }

    /// Bearer token for the vault, refreshed shortly before expiry
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() + TOKEN_EXPIRY_MARGIN < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let resp = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", VAULT_SCOPE),
            ])
            .send()
            .await
            .context("Failed to request access token")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            eyre::bail!("Failed to authenticate with key vault: {} - {}", status, body);
        }

        let token: TokenResponse = resp
            .json()
            .await
            .context("Failed to parse token response")?;
        tracing::debug!("Obtained key vault token valid for {}s", token.expires_in);

        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(token.access_token)
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T> {
        let token = self.access_token().await?;
        let resp = self
            .http
            .get(url)
            .query(&[("api-version", API_VERSION)])
            .bearer_auth(token)
            .send()
            .await
            .with_context(|| format!("Failed to query {}", url))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            eyre::bail!("Key vault request failed: {} - {}", status, body);
        }

        resp.json().await.context("Failed to parse key vault response")
    }

    /// Resolve a key reference to its key material, defaulting to the first key
    async fn fetch_key(&self, name: Option<&str>, version: Option<&str>) -> Result<JsonWebKey> {
        let url = match name {
            Some(name) => format!(
                "{}/keys/{}/{}",
                self.vault_url,
                name,
                version.unwrap_or_default()
            ),
            None => {
                let keys: KeyList = self.get(&format!("{}/keys", self.vault_url)).await?;
                let first = keys
                    .value
                    .into_iter()
                    .next()
                    .ok_or_else(|| eyre::eyre!("Key vault {} holds no keys", self.vault_url))?;
                first.kid
            }
        };

        let bundle: KeyBundle = self.get(url.trim_end_matches('/')).await?;
        Ok(bundle.key)
    }

    /// Ask the vault to sign a digest; returns the raw `r || s` bytes
    async fn sign(&self, kid: &str, digest: &B256) -> Result<Vec<u8>> {
        let token = self.access_token().await?;
        let request = SignRequest {
            alg: SIGNING_ALGORITHM,
            value: BASE64_URL.encode(digest),
        };

        let resp = self
            .http
            .post(format!("{}/sign", kid))
            .query(&[("api-version", API_VERSION)])
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .context("Failed to request remote signature")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            eyre::bail!("Remote signing failed: {} - {}", status, body);
        }

        let signed: SignResponse = resp
            .json()
            .await
            .context("Failed to parse signing response")?;
        BASE64_URL
            .decode(signed.value.trim_end_matches('='))
            .context("Remote signature is not base64url")
    }
}

/// Signer whose key lives in a remote HSM
pub struct RemoteHsmSigner {
    client: KeyVaultClient,
    kid: String,
    public_key: VerifyingKey,
    address: Address,
}

impl RemoteHsmSigner {
    /// Authenticate, resolve the configured key and derive its address
    pub async fn connect(descriptor: &RemoteHsmDescriptor) -> Result<Self> {
        let client_secret = read_secret(&descriptor.client_secret_file)
            .await
            .context("Failed to read HSM client secret")?;
        let client = KeyVaultClient::new(descriptor, client_secret)?;

        let key = client
            .fetch_key(descriptor.key_name.as_deref(), descriptor.key_version.as_deref())
            .await
            .context("Failed to resolve HSM key")?;
        let public_key = public_key_from_jwk(&key)?;
        let address = address_of(&public_key);

        tracing::info!("Loaded remote HSM signer {} ({})", address, key.kid);
        Ok(Self {
            client,
            kid: key.kid,
            public_key,
            address,
        })
    }
}

impl TransactionSigner for RemoteHsmSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_hash(&self, digest: B256) -> Result<Signature> {
        let raw = self.client.sign(&self.kid, &digest).await?;
        recover_signature(&raw, &digest, &self.public_key)
    }
}

fn public_key_from_jwk(key: &JsonWebKey) -> Result<VerifyingKey> {
    if key.kty != "EC" && key.kty != "EC-HSM" {
        eyre::bail!("HSM key {} is not an EC key ({})", key.kid, key.kty);
    }
    if key.crv.as_deref() != Some("P-256K") {
        eyre::bail!("HSM key {} is not on secp256k1 ({:?})", key.kid, key.crv);
    }

    let x = BASE64_URL.decode(&key.x).context("Invalid JWK x coordinate")?;
    let y = BASE64_URL.decode(&key.y).context("Invalid JWK y coordinate")?;
    if x.len() != 32 || y.len() != 32 {
        eyre::bail!("HSM key {} has malformed coordinates", key.kid);
    }

    let mut point = Vec::with_capacity(65);
    point.push(0x04);
    point.extend_from_slice(&x);
    point.extend_from_slice(&y);
    VerifyingKey::from_sec1_bytes(&point).context("HSM public key is not on the curve")
}

fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    Address::from_slice(&keccak256(&point.as_bytes()[1..])[12..])
}

/// Trial recovery: does `signature` under `recovery_id` recover to `key`?
fn check_candidate(
    signature: &k256::ecdsa::Signature,
    recovery_id: RecoveryId,
    digest: &B256,
    key: &VerifyingKey,
) -> bool {
    VerifyingKey::recover_from_prehash(digest.as_slice(), signature, recovery_id)
        .map(|recovered| recovered == *key)
        .unwrap_or(false)
}

/// Find the recovery id for a parity-less `(r, s)` signature
///
/// `s` is normalized to the lower half first. Candidates 0 through 3 are tried in order
/// and the first one recovering `key` wins. No match is an error: the signature was not
/// produced by this key.
pub(crate) fn recover_signature(raw: &[u8], digest: &B256, key: &VerifyingKey) -> Result<Signature> {
    let signature =
        k256::ecdsa::Signature::from_slice(raw).context("Malformed remote signature")?;
    let signature = signature.normalize_s().unwrap_or(signature);

    for candidate in 0..=3u8 {
        let Some(recovery_id) = RecoveryId::from_byte(candidate) else {
            continue;
        };
        if check_candidate(&signature, recovery_id, digest, key) {
            let (r, s) = signature.split_bytes();
            return Ok(Signature {
                v: u64::from(candidate),
                r: U256::from_be_slice(&r),
                s: U256::from_be_slice(&s),
            });
        }
    }

    eyre::bail!("Remote signature does not recover to the signer's public key")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{bind, serve};
    use alloy::signers::local::PrivateKeySigner;
    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use k256::ecdsa::SigningKey;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const SECRET: [u8; 32] = [0x11; 32];

    fn signing_key() -> SigningKey {
        SigningKey::from_slice(&SECRET).unwrap()
    }

    #[test]
    fn test_recovery_finds_parity() {
        let key = signing_key();
        let digest = keccak256(b"transaction");
        let (signature, recovery_id) = key.sign_prehash_recoverable(digest.as_slice()).unwrap();

        let recovered =
            recover_signature(&signature.to_bytes(), &digest, key.verifying_key()).unwrap();
        assert_eq!(recovered.v, u64::from(recovery_id.to_byte()));
        assert_eq!(recovered.recovery_parity(), u8::from(recovery_id.is_y_odd()));

        let address = alloy::primitives::Signature::new(
            recovered.r,
            recovered.s,
            recovered.recovery_parity() == 1,
        )
        .recover_address_from_prehash(&digest)
        .unwrap();
        assert_eq!(address, address_of(key.verifying_key()));
    }

    #[test]
    fn test_recovery_normalizes_high_s() {
        let key = signing_key();
        let digest = keccak256(b"high s");
        let (signature, _) = key.sign_prehash_recoverable(digest.as_slice()).unwrap();

        let (r, s) = signature.split_scalars();
        let high = k256::ecdsa::Signature::from_scalars(r, -*s).unwrap();
        assert!(high.normalize_s().is_some());

        let recovered =
            recover_signature(&high.to_bytes(), &digest, key.verifying_key()).unwrap();
        let (_, low_s) = signature.split_bytes();
        assert_eq!(recovered.s, U256::from_be_slice(&low_s));
    }

    #[test]
    fn test_recovery_fails_closed_for_foreign_key() {
        let other = SigningKey::from_slice(&[0x22; 32]).unwrap();
        let digest = keccak256(b"transaction");
        let (signature, _) = other.sign_prehash_recoverable(digest.as_slice()).unwrap();

        let result = recover_signature(&signature.to_bytes(), &digest, signing_key().verifying_key());
        assert!(result.is_err());
    }

    #[test]
    fn test_recovery_rejects_bad_length() {
        let digest = keccak256(b"transaction");
        assert!(recover_signature(&[1u8; 63], &digest, signing_key().verifying_key()).is_err());
    }

    #[test]
    fn test_jwk_rejects_wrong_curve() {
        let point = signing_key().verifying_key().to_encoded_point(false);
        let jwk = JsonWebKey {
            kid: "kid".to_string(),
            kty: "EC".to_string(),
            crv: Some("P-256".to_string()),
            x: BASE64_URL.encode(point.x().unwrap()),
            y: BASE64_URL.encode(point.y().unwrap()),
        };
        assert!(public_key_from_jwk(&jwk).is_err());
    }

    struct MockVault {
        base: String,
        key: SigningKey,
        token_requests: AtomicUsize,
    }

    impl MockVault {
        fn bundle(&self, name: &str, version: &str) -> Json<Value> {
            let point = self.key.verifying_key().to_encoded_point(false);
            Json(json!({
                "key": {
                    "kid": format!("{}/keys/{}/{}", self.base, name, version),
                    "kty": "EC",
                    "crv": "P-256K",
                    "x": BASE64_URL.encode(point.x().unwrap()),
                    "y": BASE64_URL.encode(point.y().unwrap()),
                }
            }))
        }
    }

    async fn token(State(vault): State<Arc<MockVault>>) -> Json<Value> {
        vault.token_requests.fetch_add(1, Ordering::SeqCst);
        Json(json!({"access_token": "hsm-token", "expires_in": 3600, "token_type": "Bearer"}))
    }

    async fn list_keys(State(vault): State<Arc<MockVault>>) -> Json<Value> {
        Json(json!({"value": [{"kid": format!("{}/keys/first", vault.base)}]}))
    }

    async fn latest_key(
        State(vault): State<Arc<MockVault>>,
        Path(name): Path<String>,
    ) -> Json<Value> {
        vault.bundle(&name, "latest")
    }

    async fn versioned_key(
        State(vault): State<Arc<MockVault>>,
        Path((name, version)): Path<(String, String)>,
    ) -> Json<Value> {
        vault.bundle(&name, &version)
    }

    async fn sign(
        State(vault): State<Arc<MockVault>>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Result<Json<Value>, StatusCode> {
        let authorized = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            == Some("Bearer hsm-token");
        if !authorized || body["alg"] != "ES256K" {
            return Err(StatusCode::UNAUTHORIZED);
        }

        let digest = BASE64_URL
            .decode(body["value"].as_str().unwrap_or_default())
            .map_err(|_| StatusCode::BAD_REQUEST)?;
        let (signature, _) = vault.key.sign_prehash_recoverable(&digest).unwrap();
        Ok(Json(json!({"value": BASE64_URL.encode(signature.to_bytes())})))
    }

    async fn spawn_mock_vault() -> Arc<MockVault> {
        let (listener, addr) = bind().await;
        let vault = Arc::new(MockVault {
            base: format!("http://{}", addr),
            key: signing_key(),
            token_requests: AtomicUsize::new(0),
        });

        let router = Router::new()
            .route("/login/:tenant/oauth2/v2.0/token", post(token))
            .route("/keys", get(list_keys))
            .route("/keys/:name", get(latest_key))
            .route("/keys/:name/:version", get(versioned_key))
            .route("/keys/:name/:version/sign", post(sign))
            .with_state(vault.clone());
        serve(listener, router);
        vault
    }

    fn descriptor(vault: &MockVault, secret_file: std::path::PathBuf) -> RemoteHsmDescriptor {
        RemoteHsmDescriptor {
            key_vault_name: "signing-vault".to_string(),
            key_name: Some("signing".to_string()),
            key_version: Some("v1".to_string()),
            client_id: "client".to_string(),
            client_secret_file: secret_file,
            tenant_id: "tenant".to_string(),
            vault_url: Some(vault.base.clone()),
            authority_url: Some(format!("{}/login", vault.base)),
        }
    }

    #[tokio::test]
    async fn test_remote_signing() {
        let vault = spawn_mock_vault().await;
        let dir = tempfile::tempdir().unwrap();
        let secret_file = dir.path().join("secret");
        std::fs::write(&secret_file, "client-secret").unwrap();

        let signer = RemoteHsmSigner::connect(&descriptor(&vault, secret_file))
            .await
            .unwrap();
        let expected = PrivateKeySigner::from_slice(&SECRET).unwrap().address();
        assert_eq!(signer.address(), expected);
        assert!(signer.kid.ends_with("/keys/signing/v1"));

        for payload in [b"first".as_slice(), b"second".as_slice()] {
            let digest = keccak256(payload);
            let signature = signer.sign_hash(digest).await.unwrap();
            assert!(signature.v <= 3);

            let recovered = alloy::primitives::Signature::new(
                signature.r,
                signature.s,
                signature.recovery_parity() == 1,
            )
            .recover_address_from_prehash(&digest)
            .unwrap();
            assert_eq!(recovered, expected);
        }

        // token cached across calls
        assert_eq!(vault.token_requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_defaults_to_first_key() {
        let vault = spawn_mock_vault().await;
        let dir = tempfile::tempdir().unwrap();
        let secret_file = dir.path().join("secret");
        std::fs::write(&secret_file, "client-secret").unwrap();

        let mut descriptor = descriptor(&vault, secret_file);
        descriptor.key_name = None;
        descriptor.key_version = None;

        let signer = RemoteHsmSigner::connect(&descriptor).await.unwrap();
        assert!(signer.kid.ends_with("/keys/first/latest"));
    }

    #[tokio::test]
    async fn test_missing_secret_fails() {
        let vault = spawn_mock_vault().await;
        let result =
            RemoteHsmSigner::connect(&descriptor(&vault, "/nonexistent/secret".into())).await;
        assert!(result.is_err());
    }
}
