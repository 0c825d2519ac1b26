use crate::url::Url;
use serde::{Deserialize, Serialize};

/// Account records returned by the query API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Account {
    /// An ADI.
    Identity(Identity),
    /// Root of a key-derived identity.
    LiteIdentity(LiteIdentity),
    /// A set of key pages.
    KeyBook(KeyBook),
    /// Keys and thresholds.
    KeyPage(KeyPage),
    /// An ADI token account.
    TokenAccount(TokenAccount),
    /// A token account under a lite identity.
    LiteTokenAccount(TokenAccount),
    /// A data account addressed by its entry hash.
    LiteDataAccount(DataAccount),
    /// An ADI data account.
    DataAccount(DataAccount),
    /// System, ledger and anything this crate does not model.
    Other(OtherAccount),
}

/// An ADI.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// URL.
    pub url: Url,
}

/// Root of a key-derived identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiteIdentity {
    /// URL.
    pub url: Url,
    /// Credits, two decimals.
    #[serde(default)]
    pub credit_balance: u64,
    /// Last time the identity signed.
    #[serde(default)]
    pub last_used_on: u64,
}

/// A set of key pages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyBook {
    /// URL.
    pub url: Url,
    /// Pages are numbered `1..=page_count`.
    pub page_count: u64,
}

/// A key page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPage {
    /// URL.
    pub url: Url,
    /// Credits, two decimals.
    #[serde(default)]
    pub credit_balance: u64,
    /// Signatures required to execute.
    #[serde(default)]
    pub accept_threshold: u64,
    /// Version, bumped on every change to the page.
    #[serde(default)]
    pub version: u64,
    /// Keys.
    #[serde(default)]
    pub keys: Vec<KeySpec>,
}

/// An entry of a key page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeySpec {
    /// Hash of the public key.
    #[serde(default, with = "hex::serde")]
    pub public_key_hash: Vec<u8>,
    /// Delegated authority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate: Option<Url>,
}

/// A token account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAccount {
    /// URL.
    pub url: Url,
    /// Token issuer.
    pub token_url: Url,
    /// Balance in the token's smallest unit.
    #[serde(default)]
    pub balance: u64,
}

/// A data account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataAccount {
    /// URL.
    pub url: Url,
}

/// An account of a kind not modelled here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtherAccount {
    /// URL.
    pub url: Url,
    /// Account type name as reported.
    pub kind: String,
}

impl Account {
    /// URL of the account.
    pub fn url(&self) -> &Url {
        match self {
            Account::Identity(a) => &a.url,
            Account::LiteIdentity(a) => &a.url,
            Account::KeyBook(a) => &a.url,
            Account::KeyPage(a) => &a.url,
            Account::TokenAccount(a) | Account::LiteTokenAccount(a) => &a.url,
            Account::LiteDataAccount(a) | Account::DataAccount(a) => &a.url,
            Account::Other(a) => &a.url,
        }
    }

    /// Account type name as used in link entries.
    pub fn type_name(&self) -> &str {
        match self {
            Account::Identity(_) => "identity",
            Account::LiteIdentity(_) => "liteIdentity",
            Account::KeyBook(_) => "keyBook",
            Account::KeyPage(_) => "keyPage",
            Account::TokenAccount(_) => "tokenAccount",
            Account::LiteTokenAccount(_) => "liteTokenAccount",
            Account::LiteDataAccount(_) => "liteDataAccount",
            Account::DataAccount(_) => "dataAccount",
            Account::Other(a) => &a.kind,
        }
    }
}
