//! Purpose tokens: deterministic tags marking who a data entry belongs to.
use crate::address::EthPublicKey;
use crate::hash::sha256;
use crate::url::Url;
use parking_lot::Mutex;
use std::collections::HashMap;
use subtle::ConstantTimeEq;

/// Tags an encrypted backup entry.
pub const ENTRY: &str = "entry";
/// Tags the wrapped encryption key.
pub const KEY: &str = "key";
/// Tags a key wrapped with `eth_decrypt`.
pub const ETH_DECRYPT: &str = "eth_decrypt";
/// Tags the backup account itself.
pub const BACKUP: &str = "backup";

/// `sha256("{address}:{suffix}")`.
pub fn token(address: &str, suffix: &str) -> [u8; 32] {
    sha256(format!("{}:{}", address, suffix))
}

/// Tokens of one account, cached per suffix.
#[derive(Debug)]
pub struct Token {
    address: String,
    cache: Mutex<HashMap<String, [u8; 32]>>,
}

impl Token {
    /// Tokens for the address of `key`.
    pub fn new(key: &EthPublicKey) -> Self {
        Token::for_address(key.address())
    }

    /// Tokens for an address string.
    pub fn for_address(address: impl Into<String>) -> Self {
        Token {
            address: address.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Address the tokens are derived from.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Token for `suffix`.
    pub fn for_suffix(&self, suffix: &str) -> [u8; 32] {
        *self
            .cache
            .lock()
            .entry(suffix.to_string())
            .or_insert_with(|| token(&self.address, suffix))
    }

    /// Token for the hex rendering of `suffix`.
    pub fn for_bytes(&self, suffix: &[u8]) -> [u8; 32] {
        self.for_suffix(&hex::encode(suffix))
    }

    /// Whether `part` equals the token for `suffix`, compared in constant time.
    pub fn matches(&self, suffix: &str, part: Option<&[u8]>) -> bool {
        match part {
            Some(part) => bool::from(part.ct_eq(&self.for_suffix(suffix)[..])),
            None => false,
        }
    }

    /// Like [`Token::matches`] for a byte suffix.
    pub fn matches_bytes(&self, suffix: &[u8], part: Option<&[u8]>) -> bool {
        self.matches(&hex::encode(suffix), part)
    }

    /// URL of the lite data account holding this account's backups.
    pub fn backup_url(&self) -> Url {
        let hash = sha256(sha256(self.for_suffix(BACKUP)));
        Url::from_authority(hex::encode(hash))
    }
}
