use super::{FileStorage, Storage, PREFIX};
use crate::config;
use crate::Error;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// An update of a named value.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    /// Hub that published the update.
    pub origin: u64,
    /// Storage key.
    pub name: String,
    /// New value.
    pub value: Value,
}

/// Carries updates between hubs, such as between browser tabs.
pub trait Transport: Send + Sync {
    /// Sends an update to every subscriber, including the sender's own.
    fn publish(&self, message: Message);

    /// Receives updates published after this call.
    fn subscribe(&self) -> broadcast::Receiver<Message>;
}

/// In-process transport over a tokio broadcast channel.
#[derive(Clone, Debug)]
pub struct Channel {
    sender: broadcast::Sender<Message>,
}

impl Channel {
    /// Channel buffering up to `capacity` undelivered messages per receiver.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Channel { sender }
    }
}

impl Default for Channel {
    fn default() -> Self {
        Channel::new(64)
    }
}

impl Transport for Channel {
    fn publish(&self, message: Message) {
        // No receivers is fine, nobody else is listening.
        let _ = self.sender.send(message);
    }

    fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.sender.subscribe()
    }
}

type Callback = Arc<dyn Fn(&Value) + Send + Sync>;

/// One participant of the shared state, such as one tab: owns the storage
/// handle and the local subscribers, and exchanges updates over a [`Transport`].
pub struct Shared {
    id: u64,
    prefix: String,
    storage: Arc<dyn Storage>,
    transport: Arc<dyn Transport>,
    subscribers: Mutex<HashMap<String, Vec<(u64, Callback)>>>,
    next_subscriber: AtomicU64,
}

/// Removes its callback when dropped.
#[must_use = "the subscription ends when this is dropped"]
pub struct Subscription {
    shared: Weak<Shared>,
    name: String,
    id: u64,
}

impl Shared {
    /// Creates a hub over `storage`, exchanging updates through `transport`.
    /// Keys live under the default prefix.
    pub fn new(storage: Arc<dyn Storage>, transport: Arc<dyn Transport>) -> Arc<Shared> {
        Self::with_prefix(storage, transport, PREFIX)
    }

    /// Creates a hub whose keys live under `prefix`.
    pub fn with_prefix(storage: Arc<dyn Storage>, transport: Arc<dyn Transport>, prefix: &str) -> Arc<Shared> {
        Arc::new(Shared {
            id: rand::random(),
            prefix: prefix.to_string(),
            storage,
            transport,
            subscribers: Mutex::new(HashMap::new()),
            next_subscriber: AtomicU64::new(0),
        })
    }

    /// Opens the configured storage file and creates a hub over it.
    pub fn open(config: &config::Storage, transport: Arc<dyn Transport>) -> Result<Arc<Shared>, Error> {
        let path = config
            .resolved_path()
            .ok_or_else(|| Error::Storage("no data directory for the storage file".to_string()))?;
        let storage = FileStorage::open(path)?;
        Ok(Self::with_prefix(Arc::new(storage), transport, &config.prefix))
    }

    /// Namespace of every key stored through this hub.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `prefix:name`.
    pub fn key(&self, name: &str) -> String {
        format!("{}:{}", self.prefix, name)
    }

    /// Identifies this hub in published messages.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Underlying storage.
    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    /// Calls `f` with every new value of `name`, local or foreign.
    pub fn subscribe(self: &Arc<Self>, name: &str, f: impl Fn(&Value) + Send + Sync + 'static) -> Subscription {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .entry(name.to_string())
            .or_default()
            .push((id, Arc::new(f)));
        Subscription {
            shared: Arc::downgrade(self),
            name: name.to_string(),
            id,
        }
    }

    /// Sends a new value of `name` to other hubs and to local subscribers.
    pub fn publish(&self, name: &str, value: Value) {
        self.transport.publish(Message {
            origin: self.id,
            name: name.to_string(),
            value: value.clone(),
        });
        self.dispatch(name, &value);
    }

    fn dispatch(&self, name: &str, value: &Value) {
        let callbacks: Vec<Callback> = match self.subscribers.lock().get(name) {
            Some(list) => list.iter().map(|(_, f)| f.clone()).collect(),
            None => return,
        };
        for f in callbacks {
            if catch_unwind(AssertUnwindSafe(|| f(value))).is_err() {
                warn!(name, "subscriber panicked");
            }
        }
    }

    /// Applies updates published by other hubs until this hub is dropped or
    /// the transport closes.
    pub fn listen(self: &Arc<Self>) -> JoinHandle<()> {
        let mut receiver = self.transport.subscribe();
        let shared = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                let message = match receiver.recv().await {
                    Ok(message) => message,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "shared state listener lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let shared = match shared.upgrade() {
                    Some(shared) => shared,
                    None => break,
                };
                if message.origin != shared.id {
                    debug!(name = %message.name, "applying foreign update");
                    shared.dispatch(&message.name, &message.value);
                }
            }
        })
    }

    fn unsubscribe(&self, name: &str, id: u64) {
        let mut subscribers = self.subscribers.lock();
        if let Some(list) = subscribers.get_mut(name) {
            list.retain(|(i, _)| *i != id);
            if list.is_empty() {
                subscribers.remove(name);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.unsubscribe(&self.name, self.id);
        }
    }
}
