//! The JSON-RPC query and submission service, seen from the client.
use crate::protocol::{Account, DataEntry, Envelope, Transaction};
use crate::url::{TxId, Url};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome of a query. Absence is a value, not an error.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryResult<T> {
    /// The record.
    Ok(T),
    /// Nothing exists at the scope.
    NotFound,
    /// The service failed.
    Error(ApiError),
}

impl<T> QueryResult<T> {
    /// Converts into `Result<Option<T>>`, absence becoming `None`.
    pub fn into_option(self) -> Result<Option<T>, ApiError> {
        match self {
            QueryResult::Ok(t) => Ok(Some(t)),
            QueryResult::NotFound => Ok(None),
            QueryResult::Error(e) => Err(e),
        }
    }

    /// Maps the record.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> QueryResult<U> {
        match self {
            QueryResult::Ok(t) => QueryResult::Ok(f(t)),
            QueryResult::NotFound => QueryResult::NotFound,
            QueryResult::Error(e) => QueryResult::Error(e),
        }
    }
}

/// Error record returned by the service.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ApiError {
    /// Status code of the failure.
    pub code: Status,
    /// Human readable message.
    pub message: String,
}

impl ApiError {
    /// Creates an error record.
    pub fn new(code: Status, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    /// Whether the error means the scope does not exist.
    pub fn is_not_found(&self) -> bool {
        self.code == Status::NOT_FOUND
    }
}

/// Status of a message or an error, numbered like HTTP codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Status(pub u16);

impl Status {
    /// Executed successfully.
    pub const OK: Status = Status(200);
    /// Executed and recorded.
    pub const DELIVERED: Status = Status(201);
    /// Waiting for signatures or anchoring.
    pub const PENDING: Status = Status(202);
    /// Executing on another partition.
    pub const REMOTE: Status = Status(203);
    /// Malformed request.
    pub const BAD_REQUEST: Status = Status(400);
    /// Refused by the executor.
    pub const NOT_ALLOWED: Status = Status(403);
    /// Does not exist.
    pub const NOT_FOUND: Status = Status(404);
    /// Service failure.
    pub const INTERNAL_ERROR: Status = Status(500);

    /// Codes from 300 upwards are failures.
    pub fn is_failure(self) -> bool {
        self.0 >= 300
    }
}

/// What to query at a scope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Query {
    /// The account or message itself.
    Default,
    /// Entries of a named chain.
    Chain {
        /// Chain name, `main` for transaction history.
        name: String,
        /// Page.
        range: RangeOptions,
    },
    /// The account's directory listing.
    Directory {
        /// Page.
        range: RangeOptions,
    },
}

/// Paging options.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RangeOptions {
    /// Index of the first record.
    pub start: u64,
    /// Maximum number of records, service default when absent.
    pub count: Option<u64>,
    /// Include full records rather than hashes.
    pub expand: bool,
}

impl Query {
    /// Main chain page starting at `start`, expanded.
    pub fn main_chain(start: u64) -> Query {
        Query::Chain {
            name: "main".to_string(),
            range: RangeOptions {
                start,
                count: None,
                expand: true,
            },
        }
    }

    /// Directory page starting at `start`.
    pub fn directory(start: u64) -> Query {
        Query::Directory {
            range: RangeOptions {
                start,
                ..RangeOptions::default()
            },
        }
    }
}

/// Query scope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scope {
    /// An account.
    Url(Url),
    /// A message.
    TxId(TxId),
}

impl From<&Url> for Scope {
    fn from(url: &Url) -> Scope {
        Scope::Url(url.clone())
    }
}

impl From<&TxId> for Scope {
    fn from(id: &TxId) -> Scope {
        Scope::TxId(id.clone())
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Url(u) => u.fmt(f),
            Scope::TxId(id) => id.fmt(f),
        }
    }
}

/// Records returned by queries.
#[derive(Clone, Debug, PartialEq)]
pub enum Record {
    /// An account.
    Account(AccountRecord),
    /// A transaction and its status.
    Message(MessageRecord),
    /// A page of chain entries.
    ChainEntries(RecordRange<ChainEntryRecord>),
    /// A page of URLs.
    Urls(RecordRange<Url>),
}

impl Record {
    /// Record kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Record::Account(_) => "account",
            Record::Message(_) => "message",
            Record::ChainEntries(_) => "chain entries",
            Record::Urls(_) => "urls",
        }
    }
}

/// An account and optionally the first page of its directory.
#[derive(Clone, Debug, PartialEq)]
pub struct AccountRecord {
    /// The account.
    pub account: Account,
    /// First directory page.
    pub directory: Option<RecordRange<Url>>,
}

/// A page of records.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordRange<T> {
    /// Records of this page.
    pub records: Vec<T>,
    /// Index of the first record.
    pub start: u64,
    /// Total number of records across pages.
    pub total: u64,
}

/// One entry of a chain.
#[derive(Clone, Debug, PartialEq)]
pub struct ChainEntryRecord {
    /// Index in the chain.
    pub index: u64,
    /// Entry hash.
    pub entry: [u8; 32],
    /// The message, when expanded.
    pub value: Option<MessageRecord>,
}

/// A transaction and its execution status.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageRecord {
    /// Transaction ID.
    pub id: TxId,
    /// Status.
    pub status: Status,
    /// Failure, if any.
    pub error: Option<ApiError>,
    /// The transaction.
    pub transaction: Option<Transaction>,
    /// Transactions produced by executing this one.
    pub produced: Vec<TxId>,
}

impl MessageRecord {
    /// Data entry written by the transaction, if it is a data write.
    pub fn data_entry(&self) -> Option<&DataEntry> {
        self.transaction.as_ref().and_then(|t| t.body.data_entry())
    }

    /// Failure of the transaction, if it failed.
    pub fn failure(&self) -> Option<ApiError> {
        match &self.error {
            Some(e) => Some(e.clone()),
            None if self.status.is_failure() => Some(ApiError::new(
                self.status,
                format!("transaction failed with status {}", self.status.0),
            )),
            None => None,
        }
    }
}

/// Per-transaction result of a submission.
#[derive(Clone, Debug, PartialEq)]
pub struct Submission {
    /// Whether the network accepted it.
    pub success: bool,
    /// Message from the network.
    pub message: String,
    /// Resulting transaction ID.
    pub id: Option<TxId>,
    /// Status error, if rejected.
    pub error: Option<ApiError>,
}

/// Network status relevant to clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    /// Oracle price: one ACME buys `oracle / 100` credits.
    pub oracle: u64,
    /// Executor version.
    pub executor_version: String,
    /// Partition IDs.
    pub partitions: Vec<String>,
}

/// Query and submission service.
#[async_trait]
pub trait Api: Send + Sync {
    /// Queries a scope.
    async fn query(&self, scope: &Scope, query: &Query) -> QueryResult<Record>;

    /// Submits signed transactions.
    async fn submit(&self, envelope: &Envelope) -> Result<Vec<Submission>, ApiError>;

    /// Current network status.
    async fn network_status(&self) -> Result<NetworkStatus, ApiError>;
}
