//! Backup stores: encrypted on-chain entries, or local ones when backups are off.
mod offline;
mod online;

pub use offline::OfflineStore;
pub use online::OnlineStore;

use crate::protocol::Transaction;
use crate::url::Url;
use crate::Error;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A backup record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Entry {
    /// Free text.
    Note {
        /// Text.
        value: String,
    },
    /// A key book the user registered.
    RegisterBook {
        /// Key book URL.
        url: String,
    },
    /// An account the user linked.
    #[serde(rename_all = "camelCase")]
    Link {
        /// Account URL.
        url: String,
        /// Account type name.
        account_type: String,
    },
    /// Undoes an earlier link.
    Unlink {
        /// Account URL.
        url: String,
    },
}

impl Entry {
    /// The URL the entry refers to, parsed. `None` for notes.
    pub fn url(&self) -> Option<Result<Url, Error>> {
        match self {
            Entry::Note { .. } => None,
            Entry::RegisterBook { url } | Entry::Link { url, .. } | Entry::Unlink { url } => Some(Url::parse(url)),
        }
    }
}

/// Signs and submits a transaction, reporting whether it executed.
#[async_trait]
pub trait SignTransaction: Send + Sync {
    /// Signs, submits and waits for `txn`. `Ok(false)` when it was not
    /// delivered, [`Error::UserRejected`] when the user declined to sign.
    async fn sign(&self, txn: Transaction) -> Result<bool, Error>;
}

/// An append-only list of entries.
#[async_trait]
pub trait Store: Send + Sync {
    /// Entries in insertion order, as of now.
    fn entries(&self) -> Vec<Entry>;

    /// Entry with the given hash.
    fn get(&self, hash: &[u8; 32]) -> Option<Entry>;

    /// Appends `entry`, signing with `sign` when the store is on-chain.
    async fn add(&self, sign: &dyn SignTransaction, entry: Entry) -> Result<bool, Error>;
}
