//! Signing, submitting and waiting for transactions.
//!
//! A [`Request`] goes through [`Phase`]s: the wallet signs it, the envelope
//! is submitted, then every resulting transaction is polled until it is
//! delivered, fails, or runs out of attempts. Delivered transactions may
//! produce further transactions, which are waited for in turn.
use crate::account::Account;
use crate::api::{Api, Query, QueryResult, Record, Scope, Status};
use crate::config::{self, Network};
use crate::driver::{Driver, SignOptions};
use crate::mounted::Mounted;
use crate::protocol::{Envelope, Transaction, Vote};
use crate::store::{Entry, SignTransaction};
use crate::url::{TxId, Url};
use crate::Error;
use async_trait::async_trait;
use futures::future::{join_all, BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

/// Where a request is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Not started.
    Idle,
    /// Waiting for the wallet.
    Signing,
    /// Waiting for the network to accept the envelope.
    Submitting,
    /// Polling this many submitted transactions.
    Waiting(usize),
    /// Every transaction was delivered.
    Done,
    /// Stopped.
    Failed(Failure),
}

/// Why a request failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Failure {
    /// Cancelled before a signature existed.
    Cancelled,
    /// The user declined to sign.
    Rejected,
    /// The wallet did not sign.
    Signing(String),
    /// The network rejected the envelope.
    Submission(String),
    /// A transaction executed and failed.
    Transaction {
        /// Transaction.
        id: TxId,
        /// Error reported by the network.
        message: String,
    },
    /// A transaction was not delivered in time.
    Timeout {
        /// Transaction.
        id: TxId,
    },
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Cancelled => write!(f, "cancelled"),
            Failure::Rejected => write!(f, "rejected in the wallet"),
            Failure::Signing(msg) => write!(f, "signing failed: {}", msg),
            Failure::Submission(msg) => write!(f, "submission failed: {}", msg),
            Failure::Transaction { id, message } => write!(f, "{} failed: {}", id, message),
            Failure::Timeout { id } => write!(f, "{} is still pending", id),
        }
    }
}

/// Final state of one transaction of the wait tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Delivered.
    Delivered {
        /// Transaction.
        id: TxId,
        /// Transactions it produced.
        produced: Vec<TxId>,
    },
    /// Executed and failed, or could not be queried.
    Failed {
        /// Transaction.
        id: TxId,
        /// Reason.
        message: String,
    },
    /// Still pending after the last attempt.
    Timeout {
        /// Transaction.
        id: TxId,
    },
}

impl WaitOutcome {
    /// The transaction.
    pub fn id(&self) -> &TxId {
        match self {
            WaitOutcome::Delivered { id, .. } | WaitOutcome::Failed { id, .. } | WaitOutcome::Timeout { id } => id,
        }
    }

    /// Whether the transaction was delivered.
    pub fn is_done(&self) -> bool {
        matches!(self, WaitOutcome::Delivered { .. })
    }

    /// First failure among `outcomes`.
    pub fn first_failure(outcomes: &[WaitOutcome]) -> Option<Failure> {
        outcomes.iter().find_map(|o| match o {
            WaitOutcome::Delivered { .. } => None,
            WaitOutcome::Failed { id, message } => Some(Failure::Transaction {
                id: id.clone(),
                message: message.clone(),
            }),
            WaitOutcome::Timeout { id } => Some(Failure::Timeout { id: id.clone() }),
        })
    }
}

/// Result of running a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    /// Final phase, either `Done` or `Failed`.
    pub phase: Phase,
    /// Every transaction waited for, parents before the transactions they produced.
    pub transactions: Vec<WaitOutcome>,
}

impl Report {
    fn failed(failure: Failure) -> Report {
        Report {
            phase: Phase::Failed(failure),
            transactions: Vec::new(),
        }
    }

    /// Whether the request succeeded.
    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }
}

/// Signer to use instead of the account's lite identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignerOptions {
    /// Key page or lite identity.
    pub signer: Url,
    /// Its version.
    pub signer_version: u64,
}

/// A transaction waiting to be signed. Runs at most once.
#[derive(Debug)]
pub struct Request {
    transaction: Transaction,
    signer: Option<SignerOptions>,
    initiated: AtomicBool,
    cancelled: AtomicBool,
    completion: Mutex<Option<oneshot::Sender<bool>>>,
}

/// Resolves when a [`Request`] finishes.
#[derive(Debug)]
pub struct Completion(oneshot::Receiver<bool>);

impl Completion {
    /// `true` when every transaction was delivered, `false` otherwise.
    pub async fn wait(self) -> bool {
        self.0.await.unwrap_or(false)
    }
}

impl Request {
    /// New request for `transaction`.
    pub fn new(transaction: Transaction, signer: Option<SignerOptions>) -> (Arc<Request>, Completion) {
        let (tx, rx) = oneshot::channel();
        let request = Request {
            transaction,
            signer,
            initiated: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            completion: Mutex::new(Some(tx)),
        };
        (Arc::new(request), Completion(rx))
    }

    /// The transaction.
    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Cancels the request. A request the wallet is signing stops once the
    /// signature arrives. Has no effect after that.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if !self.is_initiated() {
            self.complete(false);
        }
    }

    /// Whether the request was run.
    pub fn is_initiated(&self) -> bool {
        self.initiated.load(Ordering::SeqCst)
    }

    fn complete(&self, ok: bool) {
        if let Some(tx) = self.completion.lock().take() {
            let _ = tx.send(ok);
        }
    }
}

/// A status line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Line {
    /// In progress.
    Pending(String),
    /// Finished.
    Success(String),
    /// Failed.
    Failure(String),
}

/// Status lines of a flow, in order. Updates stop once unmounted.
pub struct Progress {
    mounted: Mounted,
    lines: Mutex<Vec<Line>>,
    sender: watch::Sender<Vec<Line>>,
}

impl Progress {
    /// Progress for a view that lives as long as `mounted`.
    pub fn new(mounted: Mounted) -> Self {
        let (sender, _) = watch::channel(Vec::new());
        Progress {
            mounted,
            lines: Mutex::new(Vec::new()),
            sender,
        }
    }

    /// Appends a line, returning its index.
    pub fn push(&self, line: Line) -> usize {
        let mut lines = self.lines.lock();
        let index = lines.len();
        if self.mounted.is_mounted() {
            lines.push(line);
            self.sender.send_replace(lines.clone());
        }
        index
    }

    /// Replaces the line at `index`.
    pub fn update(&self, index: usize, line: Line) {
        if !self.mounted.is_mounted() {
            return;
        }
        let mut lines = self.lines.lock();
        if let Some(slot) = lines.get_mut(index) {
            *slot = line;
            self.sender.send_replace(lines.clone());
        }
    }

    /// Receives every change.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Line>> {
        self.sender.subscribe()
    }

    /// Lines so far.
    pub fn lines(&self) -> Vec<Line> {
        self.lines.lock().clone()
    }
}

/// Signs and submits requests on behalf of an account.
pub struct Flow {
    api: Arc<dyn Api>,
    driver: Arc<Driver>,
    account: Arc<Account>,
    progress: Arc<Progress>,
    network: Network,
    phase: Mutex<Phase>,
    interval: Duration,
    attempts: u32,
}

impl Flow {
    /// Flow with the default poll settings.
    pub fn new(api: Arc<dyn Api>, driver: Arc<Driver>, account: Arc<Account>, progress: Arc<Progress>) -> Self {
        Self::with_config(api, driver, account, progress, &config::Sign::default())
    }

    /// Flow polling as configured.
    pub fn with_config(
        api: Arc<dyn Api>,
        driver: Arc<Driver>,
        account: Arc<Account>,
        progress: Arc<Progress>,
        config: &config::Sign,
    ) -> Self {
        Flow {
            api,
            driver,
            account,
            progress,
            network: Network::default(),
            phase: Mutex::new(Phase::Idle),
            interval: config.poll_interval(),
            attempts: config.poll_attempts,
        }
    }

    /// Signs for `network`, with typed data when it has an EVM endpoint.
    pub fn with_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase.lock().clone()
    }

    /// Progress lines.
    pub fn progress(&self) -> &Arc<Progress> {
        &self.progress
    }

    fn set_phase(&self, phase: Phase) {
        debug!(?phase, "sign flow");
        *self.phase.lock() = phase;
    }

    /// Runs `request`. Returns `None` when it already ran.
    pub async fn run(&self, request: &Request) -> Option<Report> {
        if request.initiated.swap(true, Ordering::SeqCst) {
            debug!("request already initiated");
            return None;
        }
        let report = self.execute(request).await;
        self.set_phase(report.phase.clone());
        request.complete(report.is_done());
        Some(report)
    }

    async fn execute(&self, request: &Request) -> Report {
        if request.cancelled.load(Ordering::SeqCst) {
            return Report::failed(Failure::Cancelled);
        }

        self.set_phase(Phase::Signing);
        let line = self.progress.push(Line::Pending("Signing".into()));
        let (signer, signer_version) = match &request.signer {
            Some(opts) => (opts.signer.clone(), opts.signer_version),
            None => (self.account.lite_id_url().clone(), 1),
        };
        let opts = SignOptions {
            public_key: self.account.public_key().clone(),
            signer,
            signer_version,
            timestamp: now_millis(),
            vote: Vote::Accept,
        };
        let mut txn = request.transaction.clone();
        let signature = match self.driver.sign_accumulate(&self.network, &mut txn, &opts).await {
            Ok(sig) if !sig.signature.is_empty() => sig,
            Ok(_) | Err(Error::UserRejected) => {
                self.progress.update(line, Line::Failure(Failure::Rejected.to_string()));
                return Report::failed(Failure::Rejected);
            }
            Err(e) => {
                self.progress.update(line, Line::Failure(e.to_string()));
                return Report::failed(Failure::Signing(e.to_string()));
            }
        };
        if request.cancelled.load(Ordering::SeqCst) {
            debug!("request cancelled while signing");
            self.progress.update(line, Line::Failure(Failure::Cancelled.to_string()));
            return Report::failed(Failure::Cancelled);
        }
        self.progress.update(line, Line::Success("Signed".into()));

        self.set_phase(Phase::Submitting);
        let line = self.progress.push(Line::Pending("Submitting".into()));
        let envelope = Envelope {
            transaction: vec![txn],
            signatures: vec![signature],
        };
        let submissions = match self.api.submit(&envelope).await {
            Ok(submissions) => submissions,
            Err(e) => {
                self.progress.update(line, Line::Failure(e.to_string()));
                return Report::failed(Failure::Submission(e.to_string()));
            }
        };
        self.progress.update(line, Line::Success("Submitted".into()));

        let rejected: Vec<String> = submissions
            .iter()
            .filter(|s| !s.success)
            .map(|s| match &s.error {
                Some(e) => e.message.clone(),
                None => s.message.clone(),
            })
            .collect();
        if !rejected.is_empty() {
            for msg in &rejected {
                self.progress.push(Line::Failure(msg.clone()));
            }
            return Report::failed(Failure::Submission(rejected.join("; ")));
        }

        let ids: Vec<TxId> = submissions.into_iter().filter_map(|s| s.id).collect();
        info!(count = ids.len(), "submitted");
        self.set_phase(Phase::Waiting(ids.len()));
        let waiter = Waiter {
            flow: self,
            seen: Mutex::new(HashSet::new()),
            outcomes: Mutex::new(Vec::new()),
        };
        join_all(ids.into_iter().map(|id| waiter.wait_for(id))).await;

        let transactions = waiter.outcomes.into_inner();
        let phase = match WaitOutcome::first_failure(&transactions) {
            Some(failure) => Phase::Failed(failure),
            None => Phase::Done,
        };
        Report { phase, transactions }
    }
}

struct Waiter<'f> {
    flow: &'f Flow,
    seen: Mutex<HashSet<TxId>>,
    outcomes: Mutex<Vec<WaitOutcome>>,
}

impl<'f> Waiter<'f> {
    fn record(&self, outcome: WaitOutcome) {
        self.outcomes.lock().push(outcome);
    }

    /// Polls `id` and everything it produces. Each transaction is polled once.
    fn wait_for(&self, id: TxId) -> BoxFuture<'_, ()> {
        async move {
            if !self.seen.lock().insert(id.clone()) {
                return;
            }
            let progress = &self.flow.progress;
            let line = progress.push(Line::Pending(id.short()));
            let scope = Scope::from(&id);

            for _ in 0..self.flow.attempts {
                let record = match self.flow.api.query(&scope, &Query::Default).await {
                    QueryResult::Ok(Record::Message(record)) => record,
                    QueryResult::Ok(other) => {
                        let message = format!("expected a message, got {}", other.kind());
                        progress.update(line, Line::Failure(message.clone()));
                        self.record(WaitOutcome::Failed { id, message });
                        return;
                    }
                    QueryResult::NotFound => {
                        tokio::time::sleep(self.flow.interval).await;
                        continue;
                    }
                    QueryResult::Error(e) if e.is_not_found() => {
                        tokio::time::sleep(self.flow.interval).await;
                        continue;
                    }
                    QueryResult::Error(e) => {
                        progress.update(line, Line::Failure(e.to_string()));
                        self.record(WaitOutcome::Failed {
                            id,
                            message: e.message,
                        });
                        return;
                    }
                };

                let not_initiated = record.status == Status::NOT_ALLOWED
                    && record
                        .error
                        .as_ref()
                        .map_or(false, |e| e.message.ends_with("has not been initiated"));
                if not_initiated {
                    debug!(%id, "ignoring status of uninitiated transaction");
                } else if let Some(e) = record.failure() {
                    progress.update(line, Line::Failure(e.message.clone()));
                    self.record(WaitOutcome::Failed {
                        id,
                        message: e.message,
                    });
                    return;
                } else if record.status != Status::DELIVERED {
                    tokio::time::sleep(self.flow.interval).await;
                    continue;
                }

                progress.update(line, Line::Success(id.short()));
                let produced = record.produced;
                self.record(WaitOutcome::Delivered {
                    id,
                    produced: produced.clone(),
                });
                join_all(produced.into_iter().map(|id| self.wait_for(id))).await;
                return;
            }

            warn!(%id, "transaction was not delivered in time");
            progress.update(line, Line::Failure(format!("{} is still pending", id.short())));
            self.record(WaitOutcome::Timeout { id });
        }
        .boxed()
    }
}

/// Declining in the wallet is an error. Any other failure is `Ok(false)`.
#[async_trait]
impl SignTransaction for Flow {
    async fn sign(&self, txn: Transaction) -> Result<bool, Error> {
        let (request, _) = Request::new(txn, None);
        match self.run(&request).await {
            Some(Report {
                phase: Phase::Failed(Failure::Rejected),
                ..
            }) => Err(Error::UserRejected),
            Some(report) => Ok(report.is_done()),
            None => Ok(false),
        }
    }
}

/// Entry registering the key book at `url`.
pub fn register_book(url: &Url) -> Entry {
    Entry::RegisterBook { url: url.to_string() }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
