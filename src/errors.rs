use crate::api::ApiError;
use readerwriter::WriteError;
use thiserror::Error;

/// Error conditions of the identity, backup and signing layer.
#[derive(Debug, Error)]
pub enum Error {
    /// Public key is neither compressed, raw nor uncompressed.
    #[error("Public key must be 33, 64 or 65 bytes long, got {0}.")]
    InvalidPublicKeyLength(usize),

    /// Public key bytes do not describe a point on the curve.
    #[error("Invalid public key.")]
    InvalidPublicKey,

    /// Signature is malformed or does not recover to a key.
    #[error("Invalid signature.")]
    InvalidSignature,

    /// Recovered key does not belong to the claimed signer.
    #[error("Signature was produced by {recovered}, expected {expected}.")]
    IdentityMismatch {
        /// Address the caller claimed.
        expected: String,
        /// Address derived from the recovered key.
        recovered: String,
    },

    /// String is not an Accumulate URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Canonical encoding failed.
    #[error("Encoding failed: {0}")]
    Encoding(#[from] WriteError),

    /// The user declined the request in the wallet.
    #[error("User rejected the request.")]
    UserRejected,

    /// The Ledger is unlocked but the Accumulate app is not open.
    #[error("The Accumulate app is not running on the Ledger device.")]
    LedgerAppNotRunning,

    /// The Ledger device is locked.
    #[error("The Ledger device is locked.")]
    LedgerLocked,

    /// Any other failure reported by the wallet provider.
    #[error("Wallet provider error: {message}")]
    Provider {
        /// EIP-1193 error code, if the provider supplied one.
        code: Option<i64>,
        /// Provider message.
        message: String,
    },

    /// The network's EVM endpoint could not be reached or gave a bad answer.
    #[error("EVM endpoint error: {0}")]
    EthRpc(String),

    /// No wallet provider is available.
    #[error("Web3 browser extension not found.")]
    ProviderMissing,

    /// A wallet is already connected.
    #[error("Already connected.")]
    AlreadyConnected,

    /// No wallet is connected.
    #[error("Not connected.")]
    NotConnected,

    /// The connected provider cannot encrypt or decrypt.
    #[error("Encryption is not supported by the connected wallet.")]
    EncryptionUnsupported,

    /// A backup entry has the wrong shape.
    #[error("Malformed backup entry: {0}")]
    MalformedEntry(String),

    /// A backup entry belongs to another key or purpose.
    #[error("Entry is not decryptable with this key.")]
    NotMine,

    /// The online store has no encryption key yet.
    #[error("Online backups are not enabled.")]
    StoreNotEnabled,

    /// The query API failed.
    #[error("{0}")]
    Api(#[from] ApiError),

    /// The query API returned a record of an unexpected kind.
    #[error("Unexpected record for {0}.")]
    UnexpectedRecord(String),

    /// Persistent storage failed.
    #[error("Storage failure: {0}")]
    Storage(String),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File system failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file does not parse.
    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

impl Error {
    /// Failures the user caused and can resolve in the wallet.
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            Error::UserRejected | Error::LedgerAppNotRunning | Error::LedgerLocked
        )
    }

    /// Failures that mean "nothing there" rather than "something broke".
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Api(e) => e.is_not_found(),
            Error::NotMine => true,
            _ => false,
        }
    }
}
