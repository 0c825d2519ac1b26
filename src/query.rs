//! Query helpers shared by the stores, the account and the linked loader.
use crate::api::{AccountRecord, Api, ApiError, Query, QueryResult, Record, RecordRange, Scope, Status};
use crate::protocol::{Account, DataEntry, Transaction};
use crate::url::Url;
use crate::Error;
use tracing::debug;

/// Fetches the account at `url`, `None` when it does not exist.
pub async fn fetch_account(api: &dyn Api, url: &Url) -> Result<Option<AccountRecord>, Error> {
    match api.query(&Scope::from(url), &Query::Default).await {
        QueryResult::Ok(Record::Account(r)) => Ok(Some(r)),
        QueryResult::Ok(other) => Err(Error::UnexpectedRecord(format!("{} ({})", url, other.kind()))),
        QueryResult::NotFound => Ok(None),
        QueryResult::Error(e) => Err(e.into()),
    }
}

/// Scans the main chain of `url` for data entries accepted by `predicate`,
/// paging until the chain is exhausted.
pub async fn fetch_data_entries(
    api: &dyn Api,
    url: &Url,
    predicate: impl Fn(&DataEntry) -> bool,
) -> Result<Vec<DataEntry>, Error> {
    let mut entries = Vec::new();
    let mut start = 0;
    loop {
        let page = match api.query(&Scope::from(url), &Query::main_chain(start)).await {
            QueryResult::Ok(Record::ChainEntries(page)) => page,
            QueryResult::Ok(other) => {
                return Err(Error::UnexpectedRecord(format!("{} ({})", url, other.kind())))
            }
            QueryResult::NotFound => break,
            QueryResult::Error(e) => return Err(e.into()),
        };
        let count = page.records.len() as u64;
        entries.extend(
            page.records
                .into_iter()
                .filter_map(|r| r.value.and_then(|m| m.data_entry().cloned()))
                .filter(|e| predicate(e)),
        );
        start = page.start + count;
        if count == 0 || start >= page.total {
            break;
        }
    }
    debug!(%url, count = entries.len(), "scanned data entries");
    Ok(entries)
}

/// Fetches one page of the directory of `url`. A missing account has an empty directory.
pub async fn fetch_directory(api: &dyn Api, url: &Url, start: u64) -> Result<RecordRange<Url>, Error> {
    match api.query(&Scope::from(url), &Query::directory(start)).await {
        QueryResult::Ok(Record::Urls(page)) => Ok(page),
        QueryResult::Ok(other) => Err(Error::UnexpectedRecord(format!("{} ({})", url, other.kind()))),
        QueryResult::NotFound => Ok(RecordRange {
            records: Vec::new(),
            start,
            total: 0,
        }),
        QueryResult::Error(e) => Err(e.into()),
    }
}

/// Buys `credits` for `recipient` from the token account `principal`, at
/// the network's current oracle price.
pub async fn buy_credits(api: &dyn Api, principal: Url, recipient: Url, credits: u64) -> Result<Transaction, Error> {
    let status = api.network_status().await?;
    debug!(oracle = status.oracle, credits, "pricing credits");
    Ok(Transaction::add_credits(principal, recipient, credits, status.oracle))
}

/// Sends `amount` from `principal` to `to`, which must be a token account.
pub async fn send_tokens(api: &dyn Api, principal: Url, to: Url, amount: u64) -> Result<Transaction, Error> {
    match fetch_account(api, &to).await? {
        Some(AccountRecord {
            account: Account::TokenAccount(_) | Account::LiteTokenAccount(_),
            ..
        }) => Ok(Transaction::send_tokens(principal, to, amount)),
        Some(other) => Err(Error::UnexpectedRecord(format!(
            "{} ({} is not a token account)",
            to,
            other.account.type_name()
        ))),
        None => Err(ApiError::new(Status::NOT_FOUND, format!("{} not found", to)).into()),
    }
}
