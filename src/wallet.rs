//! Wallet connection and login.
use crate::address::{EthPublicKey, LOGIN_MESSAGE};
use crate::driver::{Driver, EthMessage, Provider};
use crate::settings::{ConnectionType, Settings};
use crate::Error;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

/// Connection to the user's wallet.
pub struct Wallet {
    provider: Option<Arc<dyn Provider>>,
    driver: RwLock<Option<Arc<Driver>>>,
    settings: Arc<Settings>,
}

impl Wallet {
    /// Wallet over `provider`, if one is installed. Reconnects when the
    /// settings say a connection was open.
    pub fn new(provider: Option<Arc<dyn Provider>>, settings: Arc<Settings>) -> Result<Self, Error> {
        let wallet = Wallet {
            provider,
            driver: RwLock::new(None),
            settings,
        };
        if let (true, Some(kind)) = (wallet.can_connect(), wallet.settings.connected.get()) {
            debug!(?kind, "restoring wallet connection");
            wallet.connect(kind)?;
        }
        Ok(wallet)
    }

    /// Whether a provider is installed.
    pub fn can_connect(&self) -> bool {
        self.provider.is_some()
    }

    /// Whether connected.
    pub fn connected(&self) -> bool {
        self.driver.read().is_some()
    }

    /// Whether the provider can encrypt backups.
    pub fn can_encrypt(&self) -> bool {
        self.provider
            .as_ref()
            .map_or(false, |p| p.supports_encryption())
    }

    /// Connects and records the connection in the settings.
    pub fn connect(&self, kind: ConnectionType) -> Result<Arc<Driver>, Error> {
        let mut driver = self.driver.write();
        if driver.is_some() {
            return Err(Error::AlreadyConnected);
        }
        let provider = self.provider.clone().ok_or(Error::ProviderMissing)?;
        let new = Arc::new(Driver::new(provider));
        *driver = Some(new.clone());
        drop(driver);
        self.settings.connected.set(Some(kind))?;
        Ok(new)
    }

    /// Disconnects and forgets the connection.
    pub fn disconnect(&self) -> Result<(), Error> {
        *self.driver.write() = None;
        self.settings.connected.set(None)
    }

    /// The driver, when connected.
    pub fn driver(&self) -> Option<Arc<Driver>> {
        self.driver.read().clone()
    }

    fn ensure_connected(&self) -> Result<Arc<Driver>, Error> {
        match self.driver() {
            Some(driver) => Ok(driver),
            None => self.connect(self.settings.connected.get().unwrap_or(ConnectionType::Web3)),
        }
    }

    /// Asks the wallet to sign the login message as `address`, recovers
    /// the public key, caches it and selects the address.
    pub async fn login(&self, address: &str) -> Result<EthPublicKey, Error> {
        let driver = self.ensure_connected()?;
        let signature = driver
            .sign_eth_message(address, EthMessage::Text(LOGIN_MESSAGE), true)
            .await?;
        let key = EthPublicKey::recover_and_verify(&signature, LOGIN_MESSAGE.as_bytes(), address)?;
        self.settings.put_key(address, &key)?;
        self.settings.account.set(Some(address.to_string()))?;
        info!(address = %key.ethereum(), "logged in");
        Ok(key)
    }
}
