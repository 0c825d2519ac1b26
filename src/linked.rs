//! Accounts reachable from the user's link entries.
use crate::api::{Api, Query, QueryResult, Record, RecordRange, Scope};
use crate::protocol::{Account, KeyBook, KeyPage, LiteIdentity};
use crate::query::fetch_directory;
use crate::store::Entry;
use crate::url::Url;
use crate::Error;
use futures::future::{try_join_all, BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// A key book and its pages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedBook {
    /// The book.
    pub book: KeyBook,
    /// Its pages, in no particular order.
    pub pages: Vec<KeyPage>,
}

/// Snapshot of the linked accounts. Lists are unordered.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Linked {
    /// Accounts linked explicitly.
    pub direct: Vec<Account>,
    /// Every account reached.
    pub all: Vec<Account>,
    /// Key books reached, with their pages.
    pub books: Vec<LinkedBook>,
    /// Lite identities reached.
    #[serde(rename = "liteIDs")]
    pub lite_ids: Vec<LiteIdentity>,
    /// Token accounts reached.
    pub tokens: Vec<Account>,
}

impl Linked {
    /// URLs linked by `entries`: later unlinks remove earlier links. URLs
    /// that do not parse are skipped.
    pub fn urls(entries: &[Entry]) -> Vec<Url> {
        let mut urls: Vec<Url> = Vec::new();
        for entry in entries {
            let (url, link) = match entry {
                Entry::Link { url, .. } => (url, true),
                Entry::Unlink { url } => (url, false),
                _ => continue,
            };
            let url = match Url::parse(url) {
                Ok(url) => url,
                Err(e) => {
                    debug!(error = %e, "skipping link entry");
                    continue;
                }
            };
            urls.retain(|u| *u != url);
            if link {
                urls.push(url);
            }
        }
        urls
    }

    /// Loads every account reachable from the links in `entries`.
    ///
    /// Identities are expanded through their directories and key books
    /// through their pages. Each account is fetched once. Accounts that do
    /// not exist are skipped; any other failure aborts the load.
    pub async fn load(api: &dyn Api, entries: &[Entry]) -> Result<Linked, Error> {
        let loader = Loader {
            api,
            seen: Mutex::new(HashSet::new()),
            fetched: Mutex::new(HashMap::new()),
            values: Mutex::new(Linked::default()),
        };
        try_join_all(Self::urls(entries).into_iter().map(|url| loader.visit(url, true))).await?;
        Ok(loader.values.into_inner())
    }
}

struct Loader<'a> {
    api: &'a dyn Api,
    seen: Mutex<HashSet<String>>,
    fetched: Mutex<HashMap<String, Account>>,
    values: Mutex<Linked>,
}

impl<'a> Loader<'a> {
    /// Fetches `url` unless it was seen already, and follows it.
    fn visit(&self, url: Url, direct: bool) -> BoxFuture<'_, Result<Option<Account>, Error>> {
        async move {
            if !self.seen.lock().insert(url.key()) {
                return Ok(None);
            }
            let record = match self.api.query(&Scope::from(&url), &Query::Default).await {
                QueryResult::Ok(Record::Account(record)) => record,
                QueryResult::Ok(_) | QueryResult::NotFound => return Ok(None),
                QueryResult::Error(e) => return Err(e.into()),
            };
            let account = record.account;
            self.fetched.lock().insert(url.key(), account.clone());
            {
                let mut values = self.values.lock();
                if direct {
                    values.direct.push(account.clone());
                }
                values.all.push(account.clone());
            }

            match &account {
                Account::Identity(_) => self.directory(&url, record.directory).await?,
                Account::LiteIdentity(lite) => {
                    self.values.lock().lite_ids.push(lite.clone());
                    self.directory(&url, record.directory).await?;
                }
                Account::KeyBook(book) => {
                    let pages = self.pages(book).await?;
                    self.values.lock().books.push(LinkedBook {
                        book: book.clone(),
                        pages,
                    });
                }
                Account::TokenAccount(_) | Account::LiteTokenAccount(_) => {
                    self.values.lock().tokens.push(account.clone());
                }
                _ => {}
            }
            Ok(Some(account))
        }
        .boxed()
    }

    async fn directory(&self, scope: &Url, first: Option<RecordRange<Url>>) -> Result<(), Error> {
        let mut page = match first {
            Some(page) => page,
            None => fetch_directory(self.api, scope, 0).await?,
        };
        while !page.records.is_empty() {
            let count = page.records.len() as u64;
            try_join_all(page.records.into_iter().map(|url| self.visit(url, false))).await?;
            let start = page.start + count;
            if start >= page.total {
                break;
            }
            page = fetch_directory(self.api, scope, start).await?;
        }
        Ok(())
    }

    async fn pages(&self, book: &KeyBook) -> Result<Vec<KeyPage>, Error> {
        let urls: Vec<Url> = (1..=book.page_count).map(|i| book.url.join(i)).collect();
        let visited = try_join_all(urls.iter().cloned().map(|url| self.visit(url, false))).await?;
        let pages = urls
            .iter()
            .zip(visited)
            .filter_map(|(url, account)| {
                // A page reached earlier through another path is taken from the cache.
                account.or_else(|| self.fetched.lock().get(&url.key()).cloned())
            })
            .filter_map(|account| match account {
                Account::KeyPage(page) => Some(page),
                other => {
                    warn!(url = %other.url(), "key book page is not a key page");
                    None
                }
            })
            .collect();
        Ok(pages)
    }
}
