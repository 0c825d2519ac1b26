#![allow(dead_code)]
//! In-memory network and wallet used by the integration tests.
use accumulate_web3::address::{hash_message, EthPublicKey};
use accumulate_web3::api::{
    AccountRecord, ApiError, ChainEntryRecord, MessageRecord, NetworkStatus, Query, QueryResult, Record,
    RecordRange, Scope, Submission,
};
use accumulate_web3::driver::{Driver, EthRpc, Provider, ProviderError, USER_REJECTED};
use accumulate_web3::protocol::{Account, DataAccount, DataEntry, Envelope, Transaction, TransactionBody};
use accumulate_web3::sealed::{self, EncryptedData};
use accumulate_web3::settings::{Channel, MemoryStorage, Shared};
use accumulate_web3::{Api, Status, TxId, Url};
use async_trait::async_trait;
use base64::Engine as _;
use k256::ecdsa::SigningKey;
use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Directory pages are this long, so that paging is exercised.
pub const PAGE_SIZE: usize = 2;

/// What happens to one transaction of a submission. The first applies to
/// the submitted transaction, each following one to a transaction produced
/// by the previous.
#[derive(Clone, Debug)]
pub enum Outcome {
    Delivered,
    Pending,
    Failed(&'static str),
    /// Pending for this many polls, then delivered.
    DeliveredAfter(u32),
    /// Delivered, producing one transaction per listed outcome.
    Branches(Vec<Outcome>),
}

impl Outcome {
    fn is_delivered(&self) -> bool {
        matches!(self, Outcome::Delivered | Outcome::DeliveredAfter(_) | Outcome::Branches(_))
    }
}

#[derive(Default)]
struct Ledger {
    accounts: HashMap<String, Account>,
    chains: HashMap<String, Vec<MessageRecord>>,
    directories: HashMap<String, Vec<Url>>,
    messages: HashMap<TxId, MessageRecord>,
    plan: Vec<Outcome>,
    reject: Option<String>,
    produced: u64,
    ready_after: HashMap<TxId, u32>,
    polls: HashMap<TxId, u32>,
    failing: HashMap<String, String>,
}

impl Ledger {
    fn synthetic_id(&mut self) -> TxId {
        self.produced += 1;
        let synthetic = Url::parse("acc://dn.acme/synthetic").unwrap();
        synthetic.with_txid(accumulate_web3::hash::sha256(self.produced.to_be_bytes()))
    }

    /// Records `id` with `outcome`; `rest` applies to what it produces.
    fn record(&mut self, id: TxId, outcome: &Outcome, rest: &[Outcome], txn: Option<Transaction>) {
        let children: Vec<(&Outcome, &[Outcome])> = match outcome {
            Outcome::Branches(list) => list.iter().map(|o| (o, &[][..])).collect(),
            Outcome::Delivered | Outcome::DeliveredAfter(_) => rest.split_first().into_iter().collect(),
            Outcome::Pending | Outcome::Failed(_) => Vec::new(),
        };
        let mut produced = Vec::new();
        for (child, rest) in children {
            let child_id = self.synthetic_id();
            self.record(child_id.clone(), child, rest, None);
            produced.push(child_id);
        }
        let (status, error) = match outcome {
            Outcome::Delivered | Outcome::Branches(_) => (Status::DELIVERED, None),
            Outcome::DeliveredAfter(polls) => {
                self.ready_after.insert(id.clone(), *polls);
                (Status::DELIVERED, None)
            }
            Outcome::Pending => (Status::PENDING, None),
            Outcome::Failed(msg) => (Status::INTERNAL_ERROR, Some(ApiError::new(Status::INTERNAL_ERROR, *msg))),
        };
        self.messages.insert(
            id.clone(),
            MessageRecord {
                id,
                status,
                error,
                transaction: txn,
                produced,
            },
        );
    }
}

/// An in-memory Accumulate network.
#[derive(Default)]
pub struct MockApi {
    ledger: Mutex<Ledger>,
    submits: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl MockApi {
    pub fn new() -> Arc<MockApi> {
        Arc::new(MockApi::default())
    }

    pub fn add_account(&self, account: Account) {
        self.ledger.lock().accounts.insert(account.url().key(), account);
    }

    pub fn remove_account(&self, url: &Url) {
        self.ledger.lock().accounts.remove(&url.key());
    }

    pub fn add_to_directory(&self, parent: &Url, child: &Url) {
        self.ledger
            .lock()
            .directories
            .entry(parent.key())
            .or_default()
            .push(child.clone());
    }

    /// Appends a data entry to `url` as if someone else had written it.
    pub fn write_entry(&self, url: &Url, entry: DataEntry) {
        let txn = Transaction::write_data(url.clone(), entry);
        let id = url.with_txid(txn.hash().unwrap());
        let mut ledger = self.ledger.lock();
        apply(&mut ledger, &txn, &id);
    }

    /// Appends a data entry to the lite data account `url` through a
    /// write-data-to transaction paid for by another account.
    pub fn write_entry_to(&self, url: &Url, entry: DataEntry) {
        let payer = Url::parse("acc://payer.acme/tokens").unwrap();
        let txn = Transaction::write_data_to(payer.clone(), url.clone(), entry);
        let id = payer.with_txid(txn.hash().unwrap());
        let mut ledger = self.ledger.lock();
        apply(&mut ledger, &txn, &id);
    }

    /// Makes every query at `url` fail with `message`.
    pub fn fail_scope(&self, url: &Url, message: &str) {
        self.ledger.lock().failing.insert(url.key(), message.to_string());
    }

    /// Outcomes of the next submission.
    pub fn plan(&self, outcomes: Vec<Outcome>) {
        self.ledger.lock().plan = outcomes;
    }

    /// Rejects the next submission with `message`.
    pub fn reject_next(&self, message: &str) {
        self.ledger.lock().reject = Some(message.to_string());
    }

    pub fn submits(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    /// Scopes queried so far, in order. Chain and directory queries carry a
    /// `#chain` or `#directory` suffix.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }

    pub fn query_count(&self, scope: &str) -> usize {
        let scope = scope.to_ascii_lowercase();
        self.queries
            .lock()
            .iter()
            .filter(|q| q.to_ascii_lowercase() == scope)
            .count()
    }

    pub fn chain(&self, url: &Url) -> Vec<MessageRecord> {
        self.ledger.lock().chains.get(&url.key()).cloned().unwrap_or_default()
    }
}

fn apply(ledger: &mut Ledger, txn: &Transaction, id: &TxId) {
    let chain = match &txn.body {
        TransactionBody::WriteDataTo(body) => Some(&body.recipient),
        TransactionBody::WriteData(_) => Some(&txn.header.principal),
        _ => None,
    };
    if let Some(url) = chain {
        ledger
            .accounts
            .entry(url.key())
            .or_insert_with(|| Account::LiteDataAccount(DataAccount { url: url.clone() }));
    }
    let chain = chain.unwrap_or(&txn.header.principal);
    ledger
        .chains
        .entry(chain.key())
        .or_default()
        .push(MessageRecord {
            id: id.clone(),
            status: Status::DELIVERED,
            error: None,
            transaction: Some(txn.clone()),
            produced: Vec::new(),
        });
}

fn page<T: Clone>(items: &[T], start: u64) -> RecordRange<T> {
    let from = (start as usize).min(items.len());
    let to = (from + PAGE_SIZE).min(items.len());
    RecordRange {
        records: items[from..to].to_vec(),
        start,
        total: items.len() as u64,
    }
}

#[async_trait]
impl Api for MockApi {
    async fn query(&self, scope: &Scope, query: &Query) -> QueryResult<Record> {
        let label = match query {
            Query::Default => scope.to_string(),
            Query::Chain { name, .. } => format!("{}#{}", scope, name),
            Query::Directory { .. } => format!("{}#directory", scope),
        };
        self.queries.lock().push(label);
        let mut ledger = self.ledger.lock();
        if let Scope::Url(url) = scope {
            if let Some(message) = ledger.failing.get(&url.key()) {
                return QueryResult::Error(ApiError::new(Status::INTERNAL_ERROR, message.clone()));
            }
        }
        match (scope, query) {
            (Scope::TxId(id), Query::Default) => {
                let polls = {
                    let polls = ledger.polls.entry(id.clone()).or_insert(0);
                    *polls += 1;
                    *polls
                };
                let pending = ledger.ready_after.get(id).map_or(false, |n| polls <= *n);
                match ledger.messages.get(id) {
                    Some(message) => {
                        let mut message = message.clone();
                        if pending {
                            message.status = Status::PENDING;
                        }
                        QueryResult::Ok(Record::Message(message))
                    }
                    None => QueryResult::NotFound,
                }
            }
            (Scope::Url(url), Query::Default) => match ledger.accounts.get(&url.key()) {
                Some(account) => QueryResult::Ok(Record::Account(AccountRecord {
                    account: account.clone(),
                    directory: None,
                })),
                None => QueryResult::NotFound,
            },
            (Scope::Url(url), Query::Chain { range, .. }) => {
                if !ledger.accounts.contains_key(&url.key()) {
                    return QueryResult::NotFound;
                }
                let chain = ledger.chains.get(&url.key()).cloned().unwrap_or_default();
                let entries: Vec<ChainEntryRecord> = chain
                    .into_iter()
                    .enumerate()
                    .map(|(i, m)| ChainEntryRecord {
                        index: i as u64,
                        entry: *m.id.hash(),
                        value: Some(m),
                    })
                    .collect();
                QueryResult::Ok(Record::ChainEntries(page(&entries, range.start)))
            }
            (Scope::Url(url), Query::Directory { range }) => {
                if !ledger.accounts.contains_key(&url.key()) {
                    return QueryResult::NotFound;
                }
                let dir = ledger.directories.get(&url.key()).cloned().unwrap_or_default();
                QueryResult::Ok(Record::Urls(page(&dir, range.start)))
            }
            (scope, query) => QueryResult::Error(ApiError::new(
                Status::BAD_REQUEST,
                format!("cannot query {:?} at {}", query, scope),
            )),
        }
    }

    async fn submit(&self, envelope: &Envelope) -> Result<Vec<Submission>, ApiError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        let mut ledger = self.ledger.lock();
        if let Some(message) = ledger.reject.take() {
            return Ok(vec![Submission {
                success: false,
                message: message.clone(),
                id: None,
                error: Some(ApiError::new(Status::BAD_REQUEST, message)),
            }]);
        }

        let plan = std::mem::take(&mut ledger.plan);
        let mut results = Vec::new();
        for txn in &envelope.transaction {
            let id = txn.header.principal.with_txid(txn.hash().map_err(|e| ApiError::new(Status::BAD_REQUEST, e.to_string()))?);
            let outcomes = if plan.is_empty() { vec![Outcome::Delivered] } else { plan.clone() };
            let (first, rest) = match outcomes.split_first() {
                Some(split) => split,
                None => continue,
            };
            ledger.record(id.clone(), first, rest, Some(txn.clone()));
            if first.is_delivered() {
                apply(&mut ledger, txn, &id);
            }
            results.push(Submission {
                success: true,
                message: String::new(),
                id: Some(id),
                error: None,
            });
        }
        Ok(results)
    }

    async fn network_status(&self) -> Result<NetworkStatus, ApiError> {
        Ok(NetworkStatus {
            oracle: 500,
            executor_version: "v2".to_string(),
            partitions: vec!["Directory".to_string(), "Apollo".to_string()],
        })
    }
}

/// A wallet holding one secp256k1 key and one x25519 encryption key.
pub struct MockProvider {
    signing: SigningKey,
    encryption: crypto_box::SecretKey,
    encrypt: bool,
    reject: AtomicBool,
    chain_error: Mutex<Option<i64>>,
    on_sign: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
    calls: Mutex<Vec<String>>,
    params: Mutex<Vec<(String, Value)>>,
}

impl MockProvider {
    /// Wallet whose keys are derived from `seed`.
    pub fn new(seed: u64) -> Arc<MockProvider> {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        Arc::new(MockProvider {
            signing: SigningKey::random(&mut rng),
            encryption: crypto_box::SecretKey::generate(&mut rng),
            encrypt: true,
            reject: AtomicBool::new(false),
            chain_error: Mutex::new(None),
            on_sign: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            params: Mutex::new(Vec::new()),
        })
    }

    /// Wallet that cannot encrypt.
    pub fn without_encryption(seed: u64) -> Arc<MockProvider> {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        Arc::new(MockProvider {
            signing: SigningKey::random(&mut rng),
            encryption: crypto_box::SecretKey::generate(&mut rng),
            encrypt: false,
            reject: AtomicBool::new(false),
            chain_error: Mutex::new(None),
            on_sign: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            params: Mutex::new(Vec::new()),
        })
    }

    pub fn public_key(&self) -> EthPublicKey {
        EthPublicKey::new(self.signing.verifying_key().to_encoded_point(false).as_bytes()).unwrap()
    }

    pub fn address(&self) -> String {
        self.public_key().ethereum()
    }

    /// Makes the user reject every request from now on.
    pub fn reject_all(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// Makes `wallet_switchEthereumChain` fail with `code`.
    pub fn fail_chain_switch(&self, code: Option<i64>) {
        *self.chain_error.lock() = code;
    }

    /// Runs `f` while the wallet is signing a transaction, before it answers.
    pub fn on_sign(&self, f: impl Fn() + Send + Sync + 'static) {
        *self.on_sign.lock() = Some(Box::new(f));
    }

    fn signing(&self) {
        if let Some(f) = &*self.on_sign.lock() {
            f();
        }
    }

    /// Parameters of every call to `method`.
    pub fn params(&self, method: &str) -> Vec<Value> {
        self.params.lock().iter().filter(|(m, _)| m == method).map(|(_, p)| p.clone()).collect()
    }

    /// Number of calls to `method`.
    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().iter().filter(|m| *m == method).count()
    }

    fn sign_hash(&self, hash: &[u8; 32]) -> Value {
        let (sig, recid) = self.signing.sign_prehash_recoverable(hash).unwrap();
        let mut out = sig.to_bytes().to_vec();
        out.push(27 + recid.to_byte());
        json!(format!("0x{}", hex::encode(out)))
    }
}

fn param(params: &Value, i: usize) -> Result<&str, ProviderError> {
    params
        .get(i)
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::new(-32602, format!("missing parameter {}", i)))
}

#[async_trait]
impl Provider for MockProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        self.calls.lock().push(method.to_string());
        self.params.lock().push((method.to_string(), params.clone()));
        if self.reject.load(Ordering::SeqCst) && !method.starts_with("wallet_") {
            return Err(ProviderError::new(USER_REJECTED, "User rejected the request."));
        }
        match method {
            "personal_sign" => {
                let message = param(&params, 0)?;
                let bytes = match message.strip_prefix("0x") {
                    Some(h) => hex::decode(h).map_err(|e| ProviderError::new(-32602, e.to_string()))?,
                    None => message.as_bytes().to_vec(),
                };
                Ok(self.sign_hash(&hash_message(&bytes)))
            }
            "eth_sign" => {
                let message = param(&params, 1)?;
                let bytes = hex::decode(message.trim_start_matches("0x"))
                    .map_err(|e| ProviderError::new(-32602, e.to_string()))?;
                let hash: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| ProviderError::new(-32602, "eth_sign expects 32 bytes"))?;
                self.signing();
                Ok(self.sign_hash(&hash))
            }
            "eth_signTypedData_v4" => {
                let typed = param(&params, 1)?;
                serde_json::from_str::<Value>(typed).map_err(|e| ProviderError::new(-32602, e.to_string()))?;
                self.signing();
                Ok(self.sign_hash(&accumulate_web3::hash::keccak256(typed.as_bytes())))
            }
            "eth_getEncryptionPublicKey" => Ok(json!(base64::engine::general_purpose::STANDARD
                .encode(self.encryption.public_key().as_bytes()))),
            "eth_decrypt" => {
                let data = param(&params, 0)?;
                let json = hex::decode(data.trim_start_matches("0x"))
                    .map_err(|e| ProviderError::new(-32602, e.to_string()))?;
                let json = String::from_utf8(json).map_err(|e| ProviderError::new(-32602, e.to_string()))?;
                let envelope = EncryptedData::from_json(&json).map_err(|e| ProviderError::new(-32603, e.to_string()))?;
                let plain = sealed::open(&self.encryption, &envelope).map_err(|e| ProviderError::new(-32603, e.to_string()))?;
                Ok(json!(String::from_utf8_lossy(&plain)))
            }
            "eth_accounts" => Ok(json!([self.address()])),
            "eth_chainId" => Ok(json!("0x1d")),
            "wallet_switchEthereumChain" => match *self.chain_error.lock() {
                Some(code) => Err(ProviderError::new(code, "cannot switch chains")),
                None => Ok(Value::Null),
            },
            "wallet_addEthereumChain" => Ok(Value::Null),
            other => Err(ProviderError::new(-32601, format!("unsupported method {}", other))),
        }
    }

    fn supports_encryption(&self) -> bool {
        self.encrypt
    }
}

/// An EVM endpoint of an Accumulate network.
#[derive(Default)]
pub struct MockEthRpc {
    calls: Mutex<Vec<(String, String, Value)>>,
}

impl MockEthRpc {
    pub fn new() -> Arc<MockEthRpc> {
        Arc::new(MockEthRpc::default())
    }

    /// Parameters of every call to `method`.
    pub fn params(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .iter()
            .filter(|(_, m, _)| m == method)
            .map(|(_, _, p)| p.clone())
            .collect()
    }

    /// Endpoints called so far.
    pub fn endpoints(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(e, _, _)| e.clone()).collect()
    }
}

#[async_trait]
impl EthRpc for MockEthRpc {
    async fn call(&self, endpoint: &str, method: &str, params: Value) -> Result<Value, accumulate_web3::Error> {
        self.calls
            .lock()
            .push((endpoint.to_string(), method.to_string(), params.clone()));
        match method {
            "eth_chainId" => Ok(json!("0x1d")),
            "acc_typedData" => Ok(json!({
                "domain": { "name": "Accumulate", "version": "1.0.0", "chainId": 29 },
                "primaryType": "Transaction",
                "types": {},
                "message": params,
            })),
            other => Err(accumulate_web3::Error::EthRpc(format!("unsupported method {}", other))),
        }
    }
}

/// A fresh hub over memory storage.
pub fn shared() -> Arc<Shared> {
    Shared::new(Arc::new(MemoryStorage::new()), Arc::new(Channel::default()))
}

pub fn driver(provider: &Arc<MockProvider>) -> Arc<Driver> {
    Arc::new(Driver::new(provider.clone()))
}
