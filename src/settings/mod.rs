//! Persistent, cross-tab settings.
mod shared;
mod storage;
mod stored;

pub use shared::{Channel, Message, Shared, Subscription, Transport};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use stored::Stored;

use crate::address::EthPublicKey;
use crate::Error;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Default namespace of settings keys.
pub const PREFIX: &str = "web3";

/// Kind of wallet connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionType {
    /// An injected browser wallet.
    Web3,
    /// A WalletConnect session.
    WalletConnect,
}

/// Web3 settings.
pub struct Settings {
    shared: Arc<Shared>,
    /// Whether the dashboard is open.
    pub dashboard_open: Stored<bool>,
    /// Active wallet connection.
    pub connected: Stored<Option<ConnectionType>>,
    /// Selected address.
    pub account: Stored<Option<String>>,
    /// Backup preferences.
    pub backup: Stored<Map<String, Value>>,
    public_keys: Stored<BTreeMap<String, String>>,
}

impl Settings {
    /// Settings under the hub's prefix.
    pub fn new(shared: Arc<Shared>) -> Self {
        let prefix = shared.prefix().to_string();
        let prefix = prefix.as_str();
        Settings {
            dashboard_open: Stored::new(shared.clone(), prefix, "dashboardOpen", false).broadcast(),
            connected: Stored::new(shared.clone(), prefix, "connected", None).broadcast(),
            account: Stored::new(shared.clone(), prefix, "account", None).broadcast(),
            backup: Stored::new(shared.clone(), prefix, "backup", Map::new()),
            public_keys: Stored::new(shared.clone(), prefix, "publicKeys", BTreeMap::new()),
            shared,
        }
    }

    /// Hub the settings are stored through.
    pub fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    /// Cached public key of `address`.
    pub fn get_key(&self, address: &str) -> Option<EthPublicKey> {
        let keys = self.public_keys.get();
        let hex = keys.get(&normalize(address))?;
        EthPublicKey::from_hex(hex)
            .map_err(|e| debug!(address, error = %e, "cached public key is invalid"))
            .ok()
    }

    /// Caches the public key of `address`.
    pub fn put_key(&self, address: &str, key: &EthPublicKey) -> Result<(), Error> {
        self.public_keys.update(|keys| {
            keys.insert(normalize(address), key.to_hex());
        })
    }

    /// Removes every setting under the prefix.
    pub fn clear(&self) -> Result<(), Error> {
        let storage = self.shared.storage();
        let prefix = self.shared.key("");
        for key in storage.keys() {
            if key.starts_with(&prefix) {
                storage.remove_item(&key)?;
            }
        }
        Ok(())
    }
}

/// Lowercase hex without `0x`.
pub fn normalize(address: &str) -> String {
    address.trim().trim_start_matches("0x").to_lowercase()
}
