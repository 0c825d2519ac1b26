#![warn(missing_docs)]
//! Web3 identity, signing and encrypted on-chain backups for Accumulate.
//!
//! An Ethereum wallet key identifies the user. Its public key derives a lite
//! identity and a backup data account; entries written to the backup are
//! encrypted with a key that only the wallet can unwrap.

pub mod account;
pub mod address;
pub mod api;
pub mod config;
pub mod crypt;
pub mod driver;
mod errors;
pub mod hash;
pub mod linked;
mod mounted;
pub mod protocol;
pub mod query;
pub mod sealed;
pub mod settings;
pub mod sign;
pub mod store;
pub mod token;
pub mod url;
pub mod wallet;

pub use self::account::{Account, Accounts};
pub use self::address::EthPublicKey;
pub use self::api::{Api, ApiError, QueryResult, Status};
pub use self::config::Config;
pub use self::driver::{Driver, Provider, ProviderError};
pub use self::errors::Error;
pub use self::linked::{Linked, LinkedBook};
pub use self::mounted::Mounted;
pub use self::settings::{Settings, Shared};
pub use self::sign::{Flow, Phase, Request};
pub use self::store::{Entry, SignTransaction, Store};
pub use self::token::Token;
pub use self::url::{TxId, Url};
pub use self::wallet::Wallet;

#[cfg(test)]
mod tests;
