//! Ethereum-style public keys and the Accumulate identities derived from them.
use crate::hash::{keccak256, sha256};
use crate::protocol::SignatureType;
use crate::url::Url;
use crate::Error;
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use std::fmt;

/// Length of an uncompressed SEC1 public key.
pub const PUBLIC_KEY_LENGTH: usize = 65;

/// Length of an `r‖s‖v` signature.
pub const SIGNATURE_LENGTH: usize = 65;

/// Message signed to prove ownership of an address.
pub const LOGIN_MESSAGE: &str = "Login to Accumulate";

/// An uncompressed secp256k1 public key and its Ethereum key hash.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct EthPublicKey {
    public_key: [u8; PUBLIC_KEY_LENGTH],
    key_hash: [u8; 20],
}

impl EthPublicKey {
    /// Normalizes a compressed (33 bytes), raw (64 bytes) or uncompressed
    /// (65 bytes, `0x04` prefix) key.
    pub fn new(bytes: &[u8]) -> Result<Self, Error> {
        let mut public_key = [0u8; PUBLIC_KEY_LENGTH];
        match bytes.len() {
            33 => {
                let pk = k256::PublicKey::from_sec1_bytes(bytes).map_err(|_| Error::InvalidPublicKey)?;
                public_key.copy_from_slice(pk.to_encoded_point(false).as_bytes());
            }
            64 => {
                public_key[0] = 0x04;
                public_key[1..].copy_from_slice(bytes);
            }
            65 if bytes[0] == 0x04 => public_key.copy_from_slice(bytes),
            65 => return Err(Error::InvalidPublicKey),
            n => return Err(Error::InvalidPublicKeyLength(n)),
        }
        let key_hash = eth_hash(&public_key[1..]);
        Ok(EthPublicKey {
            public_key,
            key_hash,
        })
    }

    /// Parses a hex key, with or without `0x`.
    pub fn from_hex(s: &str) -> Result<Self, Error> {
        let bytes = hex::decode(s.trim_start_matches("0x")).map_err(|_| Error::InvalidPublicKey)?;
        Self::new(&bytes)
    }

    /// Recovers the key that produced `signature` over `hash`.
    /// The last signature byte selects the recovery id: `0x1c` is 1, anything else 0.
    pub fn recover(signature: &[u8], hash: &[u8; 32]) -> Result<Self, Error> {
        if signature.len() != SIGNATURE_LENGTH {
            return Err(Error::InvalidSignature);
        }
        let sig = EcdsaSignature::from_slice(&signature[..64]).map_err(|_| Error::InvalidSignature)?;
        let v = if signature[64] == 0x1c { 1 } else { 0 };
        let recid = RecoveryId::from_byte(v).ok_or(Error::InvalidSignature)?;
        let key = VerifyingKey::recover_from_prehash(hash, &sig, recid).map_err(|_| Error::InvalidSignature)?;
        Self::new(key.to_encoded_point(false).as_bytes())
    }

    /// Recovers the key that personal-signed `message` and checks it belongs to `address`.
    pub fn recover_and_verify(signature: &[u8], message: &[u8], address: &str) -> Result<Self, Error> {
        let key = Self::recover(signature, &hash_message(message))?;
        let recovered = key.ethereum();
        if !recovered.eq_ignore_ascii_case(address.trim()) {
            return Err(Error::IdentityMismatch {
                expected: address.to_string(),
                recovered,
            });
        }
        Ok(key)
    }

    /// Uncompressed key bytes.
    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.public_key
    }

    /// Last 20 bytes of Keccak-256 over the key without its prefix.
    pub fn key_hash(&self) -> &[u8; 20] {
        &self.key_hash
    }

    /// Scheme used when signing with this key.
    pub fn signature_type(&self) -> SignatureType {
        SignatureType::Eth
    }

    /// Key as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.public_key)
    }

    /// EIP-55 checksummed Ethereum address.
    pub fn ethereum(&self) -> String {
        checksum_address(&self.key_hash)
    }

    /// Accumulate rendering of the key hash: `0x` and lowercase hex.
    pub fn address(&self) -> String {
        format!("0x{}", hex::encode(self.key_hash))
    }

    /// URL of the lite identity controlled by this key.
    pub fn lite_identity(&self) -> Url {
        lite_identity_for_hash(&self.key_hash)
    }
}

impl fmt::Debug for EthPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EthPublicKey({})", self.ethereum())
    }
}

/// Last 20 bytes of Keccak-256.
pub fn eth_hash(key: &[u8]) -> [u8; 20] {
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&keccak256(key)[12..]);
    hash
}

/// EIP-55 mixed-case rendering of an address.
pub fn checksum_address(hash: &[u8; 20]) -> String {
    let lower = hex::encode(hash);
    let digest = keccak256(lower.as_bytes());
    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = (digest[i / 2] >> if i % 2 == 0 { 4 } else { 0 }) & 0x0f;
        if nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// `acc://<hash hex><checksum hex>`, the checksum being the last four bytes
/// of SHA-256 over the hash hex.
pub fn lite_identity_for_hash(hash: &[u8; 20]) -> Url {
    let hash_hex = hex::encode(hash);
    let checksum = sha256(hash_hex.as_bytes());
    Url::from_authority(format!("{}{}", hash_hex, hex::encode(&checksum[28..])))
}

/// Ethereum personal-sign hash of `message`.
pub fn hash_message(message: &[u8]) -> [u8; 32] {
    let mut data = format!("\x19Ethereum Signed Message:\n{}", message.len()).into_bytes();
    data.extend_from_slice(message);
    keccak256(data)
}
