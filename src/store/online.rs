use super::{Entry, SignTransaction, Store};
use crate::address::EthPublicKey;
use crate::api::Api;
use crate::crypt::{self, KeyCache, SealedEntry, SecretKey};
use crate::driver::Driver;
use crate::protocol::{Account, DataAccount, DataEntry, Transaction};
use crate::query::{fetch_account, fetch_data_entries};
use crate::settings::{Shared, Stored};
use crate::token::{Token, BACKUP, ENTRY, ETH_DECRYPT, KEY};
use crate::url::Url;
use crate::Error;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Default)]
struct State {
    account: Option<DataAccount>,
    raw: Option<Vec<DataEntry>>,
    key: Option<SecretKey>,
    entries: Option<Vec<SealedEntry>>,
}

/// Encrypted entries in a lite data account derived from the user's key.
pub struct OnlineStore {
    url: Url,
    address: String,
    token: Token,
    driver: Arc<Driver>,
    keys: KeyCache,
    state: RwLock<State>,
    busy: tokio::sync::Mutex<()>,
}

impl OnlineStore {
    /// Store of the account with `key`.
    pub fn new(key: &EthPublicKey, driver: Arc<Driver>, shared: Arc<Shared>) -> Self {
        let token = Token::new(key);
        let prefix = shared.key("account");
        OnlineStore {
            url: token.backup_url(),
            address: key.ethereum(),
            token,
            driver,
            keys: Stored::new(shared, &prefix, "keys", BTreeMap::new()).broadcast(),
            state: RwLock::new(State::default()),
            busy: tokio::sync::Mutex::new(()),
        }
    }

    /// URL of the backup account.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The backup account, once it exists.
    pub fn account(&self) -> Option<DataAccount> {
        self.state.read().account.clone()
    }

    /// Whether the key is known and entries can be added.
    pub fn enabled(&self) -> bool {
        let state = self.state.read();
        state.key.is_some() && state.entries.is_some()
    }

    /// Loads whatever is missing: the account, its entries, the key and the
    /// decrypted entries. Steps whose result is already known are skipped.
    pub async fn load(&self, api: &dyn Api) -> Result<(), Error> {
        let _busy = self.busy.lock().await;
        self.load_missing(api).await
    }

    async fn load_missing(&self, api: &dyn Api) -> Result<(), Error> {
        if self.state.read().account.is_none() {
            let account = match fetch_account(api, &self.url).await? {
                Some(record) => match record.account {
                    Account::LiteDataAccount(a) => Some(a),
                    other => return Err(Error::UnexpectedRecord(format!("{} ({})", self.url, other.type_name()))),
                },
                None => None,
            };
            self.state.write().account = account;
        }

        let need_raw = {
            let state = self.state.read();
            state.account.is_some() && state.raw.is_none()
        };
        if need_raw {
            let token = &self.token;
            let raw = fetch_data_entries(api, &self.url, |e| {
                token.matches(ENTRY, e.part(0)) || (token.matches(KEY, e.part(0)) && token.matches(ETH_DECRYPT, e.part(1)))
            })
            .await?;
            self.state.write().raw = Some(raw);
        }

        let key_entry = {
            let state = self.state.read();
            match (&state.raw, state.key) {
                (Some(raw), None) => raw
                    .iter()
                    .find(|e| self.token.matches(KEY, e.part(0)) && self.token.matches(ETH_DECRYPT, e.part(1)))
                    .cloned(),
                _ => None,
            }
        };
        if let Some(crypt) = key_entry {
            let key = crypt::unwrap_key(&self.driver, &self.address, &crypt, &self.keys).await?;
            self.state.write().key = Some(key);
        }

        let mut state = self.state.write();
        if state.entries.is_none() {
            let decrypted = match (&state.raw, state.key) {
                (Some(raw), Some(key)) => Some(self.decrypt_all(raw, &key)),
                _ => None,
            };
            if let Some(entries) = decrypted {
                debug!(url = %self.url, count = entries.len(), "decrypted backup entries");
                state.entries = Some(entries);
            }
        }
        Ok(())
    }

    fn decrypt_all(&self, raw: &[DataEntry], key: &SecretKey) -> Vec<SealedEntry> {
        let tag = crypt::key_tag(key);
        raw.iter()
            .filter(|e| self.token.matches(ENTRY, e.part(0)) && self.token.matches(&tag, e.part(1)))
            .filter_map(|e| match crypt::decrypt_entry(&self.token, key, e) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!(url = %self.url, error = %err, "skipping backup entry");
                    None
                }
            })
            .collect()
    }

    /// Creates the backup account and its key as needed, signing with `sign`.
    /// Returns false if a transaction was not executed. Fails up front when
    /// a key is needed and the wallet cannot encrypt.
    pub async fn setup(&self, api: &dyn Api, sign: &dyn SignTransaction) -> Result<bool, Error> {
        let _busy = self.busy.lock().await;
        self.load_missing(api).await?;
        if self.state.read().key.is_none() && !self.driver.can_encrypt() {
            return Err(Error::EncryptionUnsupported);
        }

        if self.state.read().account.is_none() {
            info!(url = %self.url, "creating backup account");
            let entry = DataEntry::double_hash(vec![Vec::new(), self.token.for_suffix(BACKUP).to_vec()]);
            if !sign.sign(Transaction::write_data(self.url.clone(), entry)).await? {
                return Ok(false);
            }
            self.load_missing(api).await?;
        }

        if self.state.read().key.is_none() {
            info!(url = %self.url, "recording backup key");
            let (key, parts) = crypt::generate_key(&self.token, &self.driver, &self.address).await?;
            let txn = Transaction::write_data(self.url.clone(), DataEntry::double_hash(parts));
            if !sign.sign(txn).await? {
                return Ok(false);
            }
            self.state.write().key = Some(key);
            self.load_missing(api).await?;
        }
        Ok(true)
    }
}

#[async_trait]
impl Store for OnlineStore {
    fn entries(&self) -> Vec<Entry> {
        match &self.state.read().entries {
            Some(entries) => entries.iter().map(|e| e.plain.clone()).collect(),
            None => Vec::new(),
        }
    }

    fn get(&self, hash: &[u8; 32]) -> Option<Entry> {
        self.state
            .read()
            .entries
            .as_ref()?
            .iter()
            .find(|e| &e.hash == hash)
            .map(|e| e.plain.clone())
    }

    async fn add(&self, sign: &dyn SignTransaction, entry: Entry) -> Result<bool, Error> {
        let key = {
            let state = self.state.read();
            match (state.key, &state.entries) {
                (Some(key), Some(_)) => key,
                _ => return Err(Error::StoreNotEnabled),
            }
        };
        let sealed = crypt::encrypt_entry(&self.token, &key, entry)?;
        let txn = Transaction::write_data(self.url.clone(), sealed.crypt.clone());
        if !sign.sign(txn).await? {
            return Ok(false);
        }
        if let Some(entries) = self.state.write().entries.as_mut() {
            entries.push(sealed);
        }
        Ok(true)
    }
}
