//! Privacy extension fields carried by EEA private transactions

use super::encoding::decode_field;
use alloy::primitives::Bytes;
use alloy::rlp::{Encodable, Header};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use eyre::{ensure, eyre, Context, Result};
use serde::{Deserialize, Serialize};

/// Enclave public keys and privacy group ids are 32 bytes
const ENCLAVE_KEY_LENGTH: usize = 32;

/// Who may see the private payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Restriction {
    #[default]
    Restricted,
    Unrestricted,
}

impl Restriction {
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Self::Restricted => b"restricted",
            Self::Unrestricted => b"unrestricted",
        }
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            b"restricted" => Some(Self::Restricted),
            b"unrestricted" => Some(Self::Unrestricted),
            _ => None,
        }
    }
}

/// Either an explicit participant list or a pre-created privacy group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrivateRecipients {
    PrivateFor(Vec<Bytes>),
    PrivacyGroupId(Bytes),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateFields {
    pub private_from: Bytes,
    pub recipients: PrivateRecipients,
    pub restriction: Restriction,
}

impl PrivateFields {
    /// Build the privacy fields from their base64 request representation
    pub fn parse(
        private_from: &str,
        private_for: Option<&[String]>,
        privacy_group_id: Option<&str>,
        restriction: Restriction,
    ) -> Result<Self> {
        let private_from = decode_enclave_key(private_from).context("Invalid privateFrom")?;

        let recipients = match (private_for, privacy_group_id) {
            (Some(_), Some(_)) => {
                eyre::bail!("privateFor and privacyGroupId are mutually exclusive")
            }
            (Some(keys), None) => {
                ensure!(!keys.is_empty(), "privateFor must not be empty");
                let keys = keys
                    .iter()
                    .map(|key| decode_enclave_key(key))
                    .collect::<Result<Vec<_>>>()
                    .context("Invalid privateFor")?;
                PrivateRecipients::PrivateFor(keys)
            }
            (None, Some(group)) => PrivateRecipients::PrivacyGroupId(
                decode_enclave_key(group).context("Invalid privacyGroupId")?,
            ),
            (None, None) => eyre::bail!("One of privateFor or privacyGroupId is required"),
        };

        Ok(Self {
            private_from,
            recipients,
            restriction,
        })
    }

    /// Append `privateFrom, privateFor|privacyGroupId, restriction` to an RLP payload
    pub(super) fn encode(&self, out: &mut Vec<u8>) {
        self.private_from.encode(out);
        match &self.recipients {
            PrivateRecipients::PrivateFor(keys) => alloy::rlp::encode_list::<_, Bytes>(keys, out),
            PrivateRecipients::PrivacyGroupId(group) => group.encode(out),
        }
        self.restriction.as_bytes().encode(out);
    }

    pub(super) fn decode(buf: &mut &[u8]) -> Result<Self> {
        let private_from: Bytes = decode_field(buf, "privateFrom")?;

        // A list here is privateFor, a string is a privacy group id
        let mut peek = *buf;
        let header =
            Header::decode(&mut peek).map_err(|e| eyre!("Failed to decode recipients: {e}"))?;
        let recipients = if header.list {
            PrivateRecipients::PrivateFor(decode_field(buf, "privateFor")?)
        } else {
            PrivateRecipients::PrivacyGroupId(decode_field(buf, "privacyGroupId")?)
        };

        let restriction: Bytes = decode_field(buf, "restriction")?;
        let restriction = Restriction::from_bytes(&restriction)
            .ok_or_else(|| eyre!("Unknown restriction {:?}", restriction))?;

        Ok(Self {
            private_from,
            recipients,
            restriction,
        })
    }
}

/// Decode a base64 enclave key, which must be 32 bytes
pub fn decode_enclave_key(value: &str) -> Result<Bytes> {
    let bytes = BASE64
        .decode(value.trim())
        .with_context(|| format!("{value} is not valid base64"))?;
    ensure!(
        bytes.len() == ENCLAVE_KEY_LENGTH,
        "enclave key must be {} bytes, got {}",
        ENCLAVE_KEY_LENGTH,
        bytes.len()
    );
    Ok(bytes.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_A: &str = "A1aVtMxLCUHmBVHXoZzzBgPbW/wj5axDpW9X8l91SGo=";
    const KEY_B: &str = "Ko2bVqD+nNlNYL5EE7y3IdOnviftjiizpjRt+HTuFBs=";

    #[test]
    fn test_parse_private_for() {
        let fields = PrivateFields::parse(
            KEY_A,
            Some(&[KEY_B.to_string()]),
            None,
            Restriction::Restricted,
        )
        .unwrap();
        assert_eq!(fields.private_from.len(), 32);
        assert!(matches!(fields.recipients, PrivateRecipients::PrivateFor(ref keys) if keys.len() == 1));
    }

    #[test]
    fn test_recipients_are_exclusive_and_required() {
        let both = PrivateFields::parse(
            KEY_A,
            Some(&[KEY_B.to_string()]),
            Some(KEY_B),
            Restriction::Restricted,
        );
        assert!(both.is_err());

        let neither = PrivateFields::parse(KEY_A, None, None, Restriction::Restricted);
        assert!(neither.is_err());

        let empty = PrivateFields::parse(KEY_A, Some(&[]), None, Restriction::Restricted);
        assert!(empty.is_err());
    }

    #[test]
    fn test_rejects_short_keys() {
        assert!(decode_enclave_key("c2hvcnQ=").is_err());
        assert!(decode_enclave_key("not base64!").is_err());
    }

    #[test]
    fn test_restriction_serde() {
        let restriction: Restriction = serde_json::from_str("\"unrestricted\"").unwrap();
        assert_eq!(restriction, Restriction::Unrestricted);
        assert_eq!(Restriction::default().as_bytes(), b"restricted");
    }
}
