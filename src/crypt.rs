//! Encryption of backup entries and of the key protecting them.
use crate::driver::Driver;
use crate::hash::sha256;
use crate::protocol::DataEntry;
use crate::sealed::EncryptedData;
use crate::settings::Stored;
use crate::store::Entry;
use crate::token::{Token, ENTRY, ETH_DECRYPT, KEY};
use crate::Error;
use std::collections::BTreeMap;
use tracing::debug;
use xsalsa20poly1305::aead::{generic_array::GenericArray, Aead, AeadCore, KeyInit, OsRng};
use xsalsa20poly1305::XSalsa20Poly1305;

/// Symmetric key protecting backup entries.
pub type SecretKey = [u8; 32];

/// Cache of unwrapped keys: entry hash hex to key hex.
pub type KeyCache = Stored<BTreeMap<String, String>>;

const NONCE_LENGTH: usize = 24;

/// A backup entry in both its on-chain and its plain form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedEntry {
    /// Hash of the on-chain entry.
    pub hash: [u8; 32],
    /// On-chain form.
    pub crypt: DataEntry,
    /// Plain form.
    pub plain: Entry,
}

/// Hex of the key hash, the suffix of the token that tags entries sealed with `key`.
pub fn key_tag(key: &SecretKey) -> String {
    hex::encode(sha256(key))
}

/// Seals `plain` as `[token(entry), token(key tag), nonce‖box]`.
pub fn encrypt_entry(token: &Token, key: &SecretKey, plain: Entry) -> Result<SealedEntry, Error> {
    let message = serde_json::to_vec(&plain)?;
    let nonce = XSalsa20Poly1305::generate_nonce(&mut OsRng);
    let sealed = XSalsa20Poly1305::new(GenericArray::from_slice(key))
        .encrypt(&nonce, message.as_slice())
        .map_err(|_| Error::MalformedEntry("encryption failed".to_string()))?;
    let mut payload = nonce.to_vec();
    payload.extend_from_slice(&sealed);
    let crypt = DataEntry::double_hash(vec![
        token.for_suffix(ENTRY).to_vec(),
        token.for_suffix(&key_tag(key)).to_vec(),
        payload,
    ]);
    Ok(SealedEntry {
        hash: crypt.hash(),
        crypt,
        plain,
    })
}

/// Opens an entry sealed with [`encrypt_entry`].
///
/// Entries of another account, another key or with a box that does not open
/// fail with [`Error::NotMine`]; the wrong number of parts or an unreadable
/// payload with [`Error::MalformedEntry`].
pub fn decrypt_entry(token: &Token, key: &SecretKey, crypt: &DataEntry) -> Result<SealedEntry, Error> {
    let parts = crypt.parts();
    if parts.len() != 3 {
        return Err(Error::MalformedEntry(format!("expected 3 parts, got {}", parts.len())));
    }
    if !token.matches(ENTRY, crypt.part(0)) || !token.matches(&key_tag(key), crypt.part(1)) {
        return Err(Error::NotMine);
    }
    if parts[2].len() < NONCE_LENGTH {
        return Err(Error::NotMine);
    }
    let (nonce, sealed) = parts[2].split_at(NONCE_LENGTH);
    let message = XSalsa20Poly1305::new(GenericArray::from_slice(key))
        .decrypt(GenericArray::from_slice(nonce), sealed)
        .map_err(|_| Error::NotMine)?;
    let plain = serde_json::from_slice(&message).map_err(|e| Error::MalformedEntry(e.to_string()))?;
    Ok(SealedEntry {
        hash: crypt.hash(),
        crypt: crypt.clone(),
        plain,
    })
}

/// Creates a fresh key and wraps it with the wallet's encryption key.
/// Returns the key and the parts of the entry recording it:
/// `[token(key), token(eth_decrypt), nonce, ephemeral key, ciphertext]`.
pub async fn generate_key(token: &Token, driver: &Driver, address: &str) -> Result<(SecretKey, Vec<Vec<u8>>), Error> {
    let key: SecretKey = XSalsa20Poly1305::generate_key(&mut OsRng).into();
    let plaintext = serde_json::to_string(&hex::encode(key))?;
    let wrapped = driver.encrypt(address, &plaintext).await?;
    let parts = vec![
        token.for_suffix(KEY).to_vec(),
        token.for_suffix(ETH_DECRYPT).to_vec(),
        wrapped.nonce,
        wrapped.ephemeral_public_key,
        wrapped.ciphertext,
    ];
    Ok((key, parts))
}

/// Unwraps a key recorded by [`generate_key`], asking the wallet only when
/// the key is not in `cache` yet.
pub async fn unwrap_key(driver: &Driver, address: &str, crypt: &DataEntry, cache: &KeyCache) -> Result<SecretKey, Error> {
    let hash = hex::encode(crypt.hash());
    if let Some(key) = cache.get().get(&hash).and_then(|k| parse_key(k).ok()) {
        debug!(entry = %hash, "key found in cache");
        return Ok(key);
    }
    let parts = crypt.parts();
    if parts.len() != 5 {
        return Err(Error::MalformedEntry(format!("expected 5 parts, got {}", parts.len())));
    }
    let wrapped = EncryptedData {
        nonce: parts[2].clone(),
        ephemeral_public_key: parts[3].clone(),
        ciphertext: parts[4].clone(),
    };
    let plaintext = driver.decrypt(address, &wrapped).await?;
    let key_hex: String = serde_json::from_str(&plaintext).map_err(|e| Error::MalformedEntry(e.to_string()))?;
    let key = parse_key(&key_hex)?;
    cache.update(|keys| {
        keys.insert(hash, hex::encode(key));
    })?;
    Ok(key)
}

fn parse_key(s: &str) -> Result<SecretKey, Error> {
    let mut key = [0u8; 32];
    hex::decode_to_slice(s, &mut key).map_err(|e| Error::MalformedEntry(format!("key: {}", e)))?;
    Ok(key)
}
