//! Client configuration, loaded from TOML.
use crate::Error;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/*
Example config file:

[network]
id = "kermit"
api = ["https://kermit.accumulatenetwork.io"]

[sign]
poll_interval_ms = 500
poll_attempts = 60

[storage]
prefix = "web3"

*/

/// Configuration of a client.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Network to talk to
    #[serde(default)]
    pub network: Network,

    /// Transaction signing options
    #[serde(default)]
    pub sign: Sign,

    /// Local storage options
    #[serde(default)]
    pub storage: Storage,
}

/// A network and its endpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    /// Short name.
    #[serde(default = "Network::default_id")]
    pub id: String,

    /// Display name.
    #[serde(default)]
    pub label: String,

    /// Whether this is the production network.
    #[serde(default)]
    pub mainnet: bool,

    /// Block explorer.
    #[serde(default)]
    pub explorer: String,

    /// JSON-RPC endpoints, preferred first.
    #[serde(default)]
    pub api: Vec<String>,

    /// EVM-compatible RPC endpoints offered to wallets.
    #[serde(default)]
    pub eth: Vec<String>,

    /// EVM chain ID, hex with `0x`. Chain switching is skipped without it.
    #[serde(default)]
    pub chain_id: Option<String>,
}

/// Signing and confirmation options.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Sign {
    /// Delay between status polls of a submitted transaction.
    #[serde(default = "Sign::default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Polls per transaction before giving up.
    #[serde(default = "Sign::default_poll_attempts")]
    pub poll_attempts: u32,
}

/// Local storage options.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Storage {
    /// Storage file. Defaults to a file in the user's data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Prefix of settings keys.
    #[serde(default = "Storage::default_prefix")]
    pub prefix: String,
}

impl Config {
    /// Reads a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Config, Error> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Returns a documentation for the config file.
    pub fn documentation() -> &'static str {
        r##"
    [network]
    id = "mainnet"               # mainnet, kermit or fozzie, or a custom network
    label = "Mainet"             # display name
    api = ["https://..."]        # JSON-RPC endpoints, preferred first
    eth = ["https://..."]        # EVM endpoints offered to the wallet
    chain_id = "0x..."           # EVM chain ID; chain switching is skipped without it

    [sign]
    poll_interval_ms = 500       # delay between transaction status polls
    poll_attempts = 60           # polls per transaction before reporting a timeout

    [storage]
    path = "/path/to/file.json"  # defaults to the user's data directory
    prefix = "web3"              # namespace of the settings keys
"##
    }
}

impl Network {
    /// Default network is mainnet.
    pub fn default_id() -> String {
        "mainnet".to_string()
    }

    /// The production network.
    pub fn mainnet() -> Network {
        Network {
            id: "mainnet".to_string(),
            label: "Mainet".to_string(),
            mainnet: true,
            explorer: "https://explorer.accumulatenetwork.io".to_string(),
            api: vec![
                "https://api-gateway.accumulate.defidevs.io".to_string(),
                "https://mainnet.accumulatenetwork.io".to_string(),
            ],
            eth: Vec::new(),
            chain_id: None,
        }
    }

    /// The Kermit testnet.
    pub fn kermit() -> Network {
        Network {
            id: "kermit".to_string(),
            label: "Kermit Testnet".to_string(),
            mainnet: false,
            explorer: "https://kermit.explorer.accumulatenetwork.io".to_string(),
            api: vec![
                "https://kermit.accumulatenetwork.io".to_string(),
                "https://testnet.accumulatenetwork.io".to_string(),
            ],
            eth: Vec::new(),
            chain_id: None,
        }
    }

    /// The Fozzie testnet.
    pub fn fozzie() -> Network {
        Network {
            id: "fozzie".to_string(),
            label: "Fozzie Testnet".to_string(),
            mainnet: false,
            explorer: "https://fozzie.explorer.accumulatenetwork.io".to_string(),
            api: vec!["https://fozzie.accumulatenetwork.io".to_string()],
            eth: Vec::new(),
            chain_id: None,
        }
    }

    /// Built-in networks.
    pub fn all() -> Vec<Network> {
        vec![Self::mainnet(), Self::kermit(), Self::fozzie()]
    }

    /// Finds a built-in network by ID or by one of its API endpoints.
    pub fn by_name(s: &str) -> Option<Network> {
        let s = s.to_lowercase();
        Self::all()
            .into_iter()
            .find(|n| n.id == s || n.api.iter().any(|a| *a == s))
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::mainnet()
    }
}

impl Sign {
    /// Half a second between polls.
    pub fn default_poll_interval_ms() -> u64 {
        500
    }

    /// Sixty polls, thirty seconds at the default interval.
    pub fn default_poll_attempts() -> u32 {
        60
    }

    /// Poll interval as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for Sign {
    fn default() -> Self {
        Sign {
            poll_interval_ms: Self::default_poll_interval_ms(),
            poll_attempts: Self::default_poll_attempts(),
        }
    }
}

impl Storage {
    /// Settings live under `web3:`.
    pub fn default_prefix() -> String {
        crate::settings::PREFIX.to_string()
    }

    /// Configured path, or `accumulate-web3/storage.json` in the data directory.
    pub fn resolved_path(&self) -> Option<PathBuf> {
        self.path.clone().or_else(|| {
            dirs::data_dir().map(|d| d.join("accumulate-web3").join("storage.json"))
        })
    }
}

impl Default for Storage {
    fn default() -> Self {
        Storage {
            path: None,
            prefix: Self::default_prefix(),
        }
    }
}
