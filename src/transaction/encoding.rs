//! RLP encoding of transactions for signing and for submission

use super::{PrivateFields, TransactionFields, UnsignedTransaction};
use crate::signer::Signature;
use alloy::primitives::{hex, keccak256, Address, Bytes, B256, U256};
use alloy::rlp::{Decodable, Encodable, Header, EMPTY_STRING_CODE};
use eyre::{ensure, eyre, Result};

/// How replay protection enters the digest and the final `v`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningScheme {
    /// Pre-EIP-155: `v = 27 + parity`
    Legacy,
    /// EIP-155: `(chainId, 0, 0)` in the digest, `v = parity + chainId * 2 + 35`
    Eip155(u64),
    /// GoQuorum private transactions: no chain id anywhere, `v = 36 + parity`
    GoQuorumPrivate,
}

impl SigningScheme {
    pub fn from_chain_id(chain_id: Option<u64>) -> Self {
        chain_id.map_or(Self::Legacy, Self::Eip155)
    }

    fn encode_replay_protection(&self, out: &mut Vec<u8>) {
        if let Self::Eip155(chain_id) = self {
            chain_id.encode(out);
            out.push(EMPTY_STRING_CODE);
            out.push(EMPTY_STRING_CODE);
        }
    }

    /// The transmitted `v` for a 0/1 recovery parity
    ///
    /// EIP-155 chain ids must not exceed [`MAX_CHAIN_ID`](crate::constants::MAX_CHAIN_ID).
    pub fn final_v(&self, parity: u8) -> u64 {
        let parity = u64::from(parity & 1);
        match self {
            Self::Legacy => parity + 27,
            Self::Eip155(chain_id) => parity + chain_id * 2 + 35,
            Self::GoQuorumPrivate => 36 + parity,
        }
    }
}

impl TransactionFields {
    /// `nonce, gasPrice, gas, to, value, data` into an open payload
    fn encode_base(&self, out: &mut Vec<u8>) {
        self.nonce.encode(out);
        self.gas_price.encode(out);
        self.gas.encode(out);
        match &self.to {
            Some(to) => to.encode(out),
            None => out.push(EMPTY_STRING_CODE),
        }
        self.value.encode(out);
        self.data.encode(out);
    }

    fn encode_privacy(&self, out: &mut Vec<u8>) {
        if let Some(privacy) = &self.privacy {
            privacy.encode(out);
        }
    }

    /// The RLP preimage of the signing digest
    pub fn signing_payload(&self, scheme: SigningScheme) -> Vec<u8> {
        let mut payload = Vec::new();
        self.encode_base(&mut payload);
        scheme.encode_replay_protection(&mut payload);
        self.encode_privacy(&mut payload);
        wrap_list(payload)
    }

    pub fn signing_hash(&self, scheme: SigningScheme) -> B256 {
        keccak256(self.signing_payload(scheme))
    }
}

impl UnsignedTransaction {
    pub fn signing_hash(&self, scheme: SigningScheme) -> B256 {
        self.fields.signing_hash(scheme)
    }

    /// Attach a backend signature, computing the transmitted `v` for `scheme`
    pub fn into_signed(self, scheme: SigningScheme, signature: &Signature) -> SignedTransaction {
        SignedTransaction {
            fields: self.fields,
            v: scheme.final_v(signature.recovery_parity()),
            r: signature.r,
            s: signature.s,
        }
    }
}

/// A signed transaction as it is submitted downstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub fields: TransactionFields,
    pub v: u64,
    pub r: U256,
    pub s: U256,
}

impl SignedTransaction {
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        self.fields.encode_base(&mut payload);
        self.v.encode(&mut payload);
        self.r.encode(&mut payload);
        self.s.encode(&mut payload);
        self.fields.encode_privacy(&mut payload);
        wrap_list(payload)
    }

    /// `0x`-prefixed hex of the encoding, as sent in `*_sendRawTransaction`
    pub fn to_hex(&self) -> String {
        hex::encode_prefixed(self.encode())
    }

    pub fn hash(&self) -> B256 {
        keccak256(self.encode())
    }

    /// Decode a raw legacy, EIP-155 or EEA private transaction
    pub fn decode(raw: &[u8]) -> Result<Self> {
        let mut buf = raw;
        let header =
            Header::decode(&mut buf).map_err(|e| eyre!("Failed to decode transaction: {e}"))?;
        ensure!(header.list, "transaction is not an RLP list");
        ensure!(
            buf.len() == header.payload_length,
            "transaction length mismatch: header says {}, found {}",
            header.payload_length,
            buf.len()
        );

        let nonce = decode_field(&mut buf, "nonce")?;
        let gas_price = decode_field(&mut buf, "gasPrice")?;
        let gas = decode_field(&mut buf, "gas")?;
        let to: Bytes = decode_field(&mut buf, "to")?;
        let to = match to.len() {
            0 => None,
            20 => Some(Address::from_slice(&to)),
            len => eyre::bail!("receiver must be empty or 20 bytes, got {}", len),
        };
        let value = decode_field(&mut buf, "value")?;
        let data = decode_field(&mut buf, "data")?;
        let v = decode_field(&mut buf, "v")?;
        let r = decode_field(&mut buf, "r")?;
        let s = decode_field(&mut buf, "s")?;

        let privacy = if buf.is_empty() {
            None
        } else {
            Some(PrivateFields::decode(&mut buf)?)
        };
        ensure!(buf.is_empty(), "trailing fields after transaction");

        Ok(Self {
            fields: TransactionFields {
                nonce,
                gas_price,
                gas,
                to,
                value,
                data,
                privacy,
            },
            v,
            r,
            s,
        })
    }
}

fn wrap_list(payload: Vec<u8>) -> Vec<u8> {
    let header = Header {
        list: true,
        payload_length: payload.len(),
    };
    let mut out = Vec::with_capacity(header.length() + payload.len());
    header.encode(&mut out);
    out.extend_from_slice(&payload);
    out
}

pub(super) fn decode_field<T: Decodable>(buf: &mut &[u8], field: &str) -> Result<T> {
    T::decode(buf).map_err(|e| eyre!("Failed to decode {field}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{PrivateFields, Restriction};
    use alloy::primitives::address;

    /// The worked example from EIP-155
    fn eip155_example() -> TransactionFields {
        TransactionFields {
            nonce: U256::from(9),
            gas_price: U256::from(20_000_000_000u64),
            gas: U256::from(21_000),
            to: Some(address!("3535353535353535353535353535353535353535")),
            value: U256::from(1_000_000_000_000_000_000u64),
            data: Bytes::new(),
            privacy: None,
        }
    }

    fn signature(v: u64) -> Signature {
        Signature {
            v,
            r: U256::from_str_radix(
                "28ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276",
                16,
            )
            .unwrap(),
            s: U256::from_str_radix(
                "67cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83",
                16,
            )
            .unwrap(),
        }
    }

    #[test]
    fn test_eip155_signing_payload() {
        let fields = eip155_example();
        assert_eq!(
            hex::encode(fields.signing_payload(SigningScheme::Eip155(1))),
            "ec098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a764000080018080"
        );
        assert_eq!(
            fields.signing_hash(SigningScheme::Eip155(1)),
            "0xdaf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
                .parse::<B256>()
                .unwrap()
        );
    }

    #[test]
    fn test_eip155_signed_encoding() {
        let unsigned = UnsignedTransaction {
            sender: Address::ZERO,
            fields: eip155_example(),
        };
        // parity 0 expressed in the legacy offset convention
        let signed = unsigned.into_signed(SigningScheme::Eip155(1), &signature(27));

        assert_eq!(signed.v, 37);
        assert_eq!(
            signed.to_hex(),
            "0xf86c098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a76400008025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276a067cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83"
        );
    }

    #[test]
    fn test_chain_id_shifts_v_by_twice_the_difference() {
        for parity in [0u8, 1] {
            let a = SigningScheme::Eip155(2018).final_v(parity);
            let b = SigningScheme::Eip155(6).final_v(parity);
            assert_eq!(a - b, 2 * (2018 - 6));
        }
        assert_eq!(SigningScheme::Legacy.final_v(1), 28);
        assert_eq!(SigningScheme::GoQuorumPrivate.final_v(0), 36);
        assert_eq!(SigningScheme::GoQuorumPrivate.final_v(1), 37);
    }

    #[test]
    fn test_chain_id_only_in_eip155_digest() {
        let fields = eip155_example();
        let legacy = fields.signing_payload(SigningScheme::Legacy);
        assert_eq!(legacy, fields.signing_payload(SigningScheme::GoQuorumPrivate));
        assert_ne!(legacy, fields.signing_payload(SigningScheme::Eip155(1)));
        assert_ne!(
            fields.signing_hash(SigningScheme::Eip155(1)),
            fields.signing_hash(SigningScheme::Eip155(2))
        );
    }

    #[test]
    fn test_decode_reproduces_every_field() {
        let mut fields = eip155_example();
        fields.to = None;
        fields.nonce = U256::ZERO;
        fields.data = Bytes::from(vec![0x60, 0x80, 0x60, 0x40]);
        let unsigned = UnsignedTransaction {
            sender: Address::ZERO,
            fields: fields.clone(),
        };

        let signed = unsigned.into_signed(SigningScheme::Eip155(6), &signature(1));
        let decoded = SignedTransaction::decode(&signed.encode()).unwrap();

        assert_eq!(decoded, signed);
        assert_eq!(decoded.fields, fields);
        assert_eq!(decoded.v, 48);
    }

    #[test]
    fn test_private_encoding_round_trips() {
        let privacy = PrivateFields::parse(
            "A1aVtMxLCUHmBVHXoZzzBgPbW/wj5axDpW9X8l91SGo=",
            Some(&["Ko2bVqD+nNlNYL5EE7y3IdOnviftjiizpjRt+HTuFBs=".to_string()]),
            None,
            Restriction::Restricted,
        )
        .unwrap();
        let group = PrivateFields::parse(
            "A1aVtMxLCUHmBVHXoZzzBgPbW/wj5axDpW9X8l91SGo=",
            None,
            Some("Ko2bVqD+nNlNYL5EE7y3IdOnviftjiizpjRt+HTuFBs="),
            Restriction::Unrestricted,
        )
        .unwrap();

        for privacy in [privacy, group] {
            let mut fields = eip155_example();
            fields.privacy = Some(privacy);

            // privacy fields are part of the digest
            assert_ne!(
                fields.signing_hash(SigningScheme::Eip155(1)),
                eip155_example().signing_hash(SigningScheme::Eip155(1))
            );

            let signed = UnsignedTransaction {
                sender: Address::ZERO,
                fields,
            }
            .into_signed(SigningScheme::Eip155(1), &signature(0));
            assert_eq!(SignedTransaction::decode(&signed.encode()).unwrap(), signed);
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(SignedTransaction::decode(&[]).is_err());
        assert!(SignedTransaction::decode(&[0x80]).is_err());
        let mut raw = hex::decode("f86c098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a76400008025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276a067cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83").unwrap();
        raw.push(0x01);
        assert!(SignedTransaction::decode(&raw).is_err());
    }
}
