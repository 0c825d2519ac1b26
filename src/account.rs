//! The user's identity: a public key and the Accumulate state attached to it.
use crate::address::EthPublicKey;
use crate::api::Api;
use crate::driver::Driver;
use crate::linked::LinkedBook;
use crate::mounted::Mounted;
use crate::protocol::{Account as ProtocolAccount, DataAccount, KeyBook, LiteIdentity};
use crate::query::fetch_account;
use crate::settings::{Settings, Shared};
use crate::store::{Entry, OfflineStore, OnlineStore, SignTransaction, Store};
use crate::url::Url;
use crate::Error;
use futures::future::try_join_all;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

#[derive(Default)]
struct State {
    lite_identity: Option<LiteIdentity>,
    entries: Option<Vec<Entry>>,
    registered_books: Option<Vec<LinkedBook>>,
}

/// A Web3 identity. One instance per public key, see [`Accounts`].
pub struct Account {
    public_key: EthPublicKey,
    lite_id_url: Url,
    online: OnlineStore,
    offline: OfflineStore,
    state: RwLock<State>,
    busy: tokio::sync::Mutex<()>,
}

impl Account {
    /// Account of `public_key`.
    pub fn new(public_key: EthPublicKey, driver: Arc<Driver>, shared: Arc<Shared>) -> Self {
        Account {
            lite_id_url: public_key.lite_identity(),
            online: OnlineStore::new(&public_key, driver, shared.clone()),
            offline: OfflineStore::new(&public_key, shared),
            public_key,
            state: RwLock::new(State::default()),
            busy: tokio::sync::Mutex::new(()),
        }
    }

    /// The key.
    pub fn public_key(&self) -> &EthPublicKey {
        &self.public_key
    }

    /// Ethereum address of the key.
    pub fn ethereum(&self) -> String {
        self.public_key.ethereum()
    }

    /// URL of the key's lite identity.
    pub fn lite_id_url(&self) -> &Url {
        &self.lite_id_url
    }

    /// URL of the backup account.
    pub fn backup_url(&self) -> &Url {
        self.online.url()
    }

    /// The lite identity, once it exists on chain.
    pub fn lite_identity(&self) -> Option<LiteIdentity> {
        self.state.read().lite_identity.clone()
    }

    /// The backup account, once it exists on chain.
    pub fn backup_account(&self) -> Option<DataAccount> {
        self.online.account()
    }

    /// Decrypted backup entries, once the backup key is known.
    pub fn entries(&self) -> Option<Vec<Entry>> {
        self.state.read().entries.clone()
    }

    /// Key books registered in the backup.
    pub fn registered_books(&self) -> Option<Vec<LinkedBook>> {
        self.state.read().registered_books.clone()
    }

    /// On-chain store.
    pub fn online(&self) -> &OnlineStore {
        &self.online
    }

    /// Local store.
    pub fn offline(&self) -> &OfflineStore {
        &self.offline
    }

    /// The on-chain store when it is enabled, else the local one.
    pub fn store(&self) -> &dyn Store {
        if self.online.enabled() {
            &self.online
        } else {
            &self.offline
        }
    }

    /// Loads whatever is missing. Safe to call repeatedly and concurrently.
    pub async fn load(&self, api: &dyn Api) -> Result<(), Error> {
        let _busy = self.busy.lock().await;
        if self.state.read().lite_identity.is_none() {
            let lite = self.fetch_lite_identity(api).await?;
            self.state.write().lite_identity = lite;
        }

        self.online.load(api).await?;
        if self.online.enabled() {
            self.state.write().entries = Some(self.online.entries());
        }

        let entries = {
            let state = self.state.read();
            match (&state.entries, &state.registered_books) {
                (Some(entries), None) => Some(entries.clone()),
                _ => None,
            }
        };
        if let Some(entries) = entries {
            let books = load_registered(api, &entries).await?;
            self.state.write().registered_books = Some(books);
        }
        Ok(())
    }

    /// Fetches the lite identity again, for instance after buying credits.
    pub async fn reload_lite_identity(&self, api: &dyn Api) -> Result<(), Error> {
        let lite = self.fetch_lite_identity(api).await?;
        self.state.write().lite_identity = lite;
        Ok(())
    }

    async fn fetch_lite_identity(&self, api: &dyn Api) -> Result<Option<LiteIdentity>, Error> {
        match fetch_account(api, &self.lite_id_url).await? {
            Some(record) => match record.account {
                ProtocolAccount::LiteIdentity(lite) => Ok(Some(lite)),
                other => Err(Error::UnexpectedRecord(format!(
                    "{} ({})",
                    self.lite_id_url,
                    other.type_name()
                ))),
            },
            None => Ok(None),
        }
    }

    /// Adds an entry to the current store.
    pub async fn add_entry(&self, sign: &dyn SignTransaction, entry: Entry) -> Result<bool, Error> {
        let registers = matches!(entry, Entry::RegisterBook { .. });
        let online = self.online.enabled();
        if !self.store().add(sign, entry).await? {
            return Ok(false);
        }
        if online {
            let mut state = self.state.write();
            state.entries = Some(self.online.entries());
            if registers {
                state.registered_books = None;
            }
        }
        Ok(true)
    }
}

async fn load_registered(api: &dyn Api, entries: &[Entry]) -> Result<Vec<LinkedBook>, Error> {
    let urls: Vec<Url> = entries
        .iter()
        .filter(|e| matches!(e, Entry::RegisterBook { .. }))
        .filter_map(|e| match e.url()? {
            Ok(url) => Some(url),
            Err(err) => {
                warn!(error = %err, "ignoring registered book");
                None
            }
        })
        .collect();
    let books = try_join_all(urls.iter().map(|url| load_book(api, url))).await?;
    Ok(books.into_iter().flatten().collect())
}

async fn load_book(api: &dyn Api, url: &Url) -> Result<Option<LinkedBook>, Error> {
    let book: KeyBook = match fetch_account(api, url).await? {
        Some(record) => match record.account {
            ProtocolAccount::KeyBook(book) => book,
            _ => return Ok(None),
        },
        None => return Ok(None),
    };
    let pages = try_join_all((1..=book.page_count).map(|i| {
        let page = book.url.join(i);
        async move {
            match fetch_account(api, &page).await? {
                Some(record) => match record.account {
                    ProtocolAccount::KeyPage(page) => Ok::<_, Error>(Some(page)),
                    _ => Ok(None),
                },
                None => Ok(None),
            }
        }
    }))
    .await?;
    Ok(Some(LinkedBook {
        book,
        pages: pages.into_iter().flatten().collect(),
    }))
}

/// Registry of accounts: at most one [`Account`] per public key.
pub struct Accounts {
    driver: Arc<Driver>,
    shared: Arc<Shared>,
    instances: Mutex<HashMap<String, Arc<OnceCell<Arc<Account>>>>>,
}

impl Accounts {
    /// Empty registry.
    pub fn new(driver: Arc<Driver>, shared: Arc<Shared>) -> Self {
        Accounts {
            driver,
            shared,
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Whether backups are supported by the wallet.
    pub fn supported(&self) -> bool {
        self.driver.can_encrypt()
    }

    /// The account of `public_key`, created on first use.
    pub async fn for_key(&self, public_key: &EthPublicKey) -> Arc<Account> {
        let cell = self
            .instances
            .lock()
            .entry(public_key.to_hex())
            .or_default()
            .clone();
        cell.get_or_init(|| async {
            debug!(address = %public_key.ethereum(), "creating account");
            Arc::new(Account::new(
                public_key.clone(),
                self.driver.clone(),
                self.shared.clone(),
            ))
        })
        .await
        .clone()
    }

    /// The account selected in `settings`, loaded. `None` when nothing is
    /// selected, the selected address has no cached key, or `mounted` was
    /// torn down meanwhile.
    pub async fn current(&self, settings: &Settings, api: &dyn Api, mounted: &Mounted) -> Result<Option<Arc<Account>>, Error> {
        let address = match settings.account.get() {
            Some(address) => address,
            None => return Ok(None),
        };
        let key = match settings.get_key(&address) {
            Some(key) => key,
            None => return Ok(None),
        };
        let account = self.for_key(&key).await;
        account.load(api).await?;
        if !mounted.is_mounted() {
            return Ok(None);
        }
        Ok(Some(account))
    }
}
