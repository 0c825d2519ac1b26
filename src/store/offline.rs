use super::{Entry, SignTransaction, Store};
use crate::address::EthPublicKey;
use crate::hash::sha256;
use crate::settings::{Shared, Stored};
use crate::Error;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

const VERSION: u32 = 1;

/// Entries of every account, keyed by public key hex.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Entries {
    version: u32,
    accounts: BTreeMap<String, Vec<Entry>>,
}

impl Default for Entries {
    fn default() -> Self {
        Entries {
            version: VERSION,
            accounts: BTreeMap::new(),
        }
    }
}

/// Entries kept in local storage, shared with other tabs.
pub struct OfflineStore {
    account: String,
    entries: Stored<Entries>,
    write: Mutex<()>,
}

impl OfflineStore {
    /// Store of the account with `key`, in `<prefix>:store:entries`.
    pub fn new(key: &EthPublicKey, shared: Arc<Shared>) -> Self {
        let prefix = shared.key("store");
        OfflineStore {
            account: key.to_hex(),
            entries: Stored::new(shared, &prefix, "entries", Entries::default()).broadcast(),
            write: Mutex::new(()),
        }
    }

    fn load(&self) -> Entries {
        let entries = self.entries.get();
        if entries.version == VERSION {
            entries
        } else {
            Entries::default()
        }
    }

    /// Appends without signing anything.
    pub fn push(&self, entry: Entry) -> Result<(), Error> {
        let _guard = self.write.lock();
        let mut entries = self.load();
        entries
            .accounts
            .entry(self.account.clone())
            .or_default()
            .push(entry);
        self.entries.set(entries)
    }
}

/// Hash of an offline entry: SHA-256 of its JSON.
pub fn entry_hash(entry: &Entry) -> Result<[u8; 32], Error> {
    Ok(sha256(serde_json::to_vec(entry)?))
}

#[async_trait]
impl Store for OfflineStore {
    fn entries(&self) -> Vec<Entry> {
        self.load()
            .accounts
            .remove(&self.account)
            .unwrap_or_default()
    }

    fn get(&self, hash: &[u8; 32]) -> Option<Entry> {
        self.entries()
            .into_iter()
            .find(|e| entry_hash(e).map_or(false, |h| &h == hash))
    }

    async fn add(&self, _sign: &dyn SignTransaction, entry: Entry) -> Result<bool, Error> {
        self.push(entry)?;
        Ok(true)
    }
}
