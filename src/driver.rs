//! Bridge to an EIP-1193 wallet provider.
use crate::address::EthPublicKey;
use crate::config::Network;
use crate::hash::sha256_pair;
use crate::protocol::{Signature, SignatureType, Transaction, Vote};
use crate::sealed::{self, EncryptedData};
use crate::url::Url;
use crate::Error;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// EIP-1193 code for a request the user declined.
pub const USER_REJECTED: i64 = 4001;

/// EIP-1193 code for a chain the wallet does not know.
pub const UNRECOGNIZED_CHAIN: i64 = 4902;

const LEDGER_PREFIX: &str = "Ledger device: ";

/// Error object returned by a provider.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProviderError {
    /// EIP-1193 code.
    pub code: Option<i64>,
    /// Code of the wrapped cause, some wallets nest the rejection.
    pub cause_code: Option<i64>,
    /// Hardware wallet APDU status.
    pub status_code: Option<u64>,
    /// Message.
    pub message: String,
}

impl ProviderError {
    /// Error with a code and message.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        ProviderError {
            code: Some(code),
            message: message.into(),
            ..ProviderError::default()
        }
    }
}

/// An injected wallet, such as a browser extension.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Performs an RPC request.
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError>;

    /// Whether `eth_getEncryptionPublicKey` and `eth_decrypt` are available.
    fn supports_encryption(&self) -> bool {
        false
    }

    /// Whether `personal_sign` is available.
    fn supports_personal_sign(&self) -> bool {
        true
    }
}

/// JSON-RPC access to a network's EVM endpoints (`Network::eth`).
#[async_trait]
pub trait EthRpc: Send + Sync {
    /// Calls `method` on `endpoint` and returns the result member.
    async fn call(&self, endpoint: &str, method: &str, params: Value) -> Result<Value, Error>;
}

/// Message to sign.
#[derive(Clone, Copy, Debug)]
pub enum EthMessage<'a> {
    /// UTF-8 text.
    Text(&'a str),
    /// Raw bytes, sent as hex.
    Bytes(&'a [u8]),
}

impl EthMessage<'_> {
    fn to_param(self) -> String {
        match self {
            EthMessage::Text(s) => s.to_string(),
            EthMessage::Bytes(b) => format!("0x{}", hex::encode(b)),
        }
    }
}

/// Signer details for an Accumulate transaction.
#[derive(Clone, Debug)]
pub struct SignOptions {
    /// Key doing the signing.
    pub public_key: EthPublicKey,
    /// Key page or lite identity.
    pub signer: Url,
    /// Version of the signer.
    pub signer_version: u64,
    /// Milliseconds since the epoch.
    pub timestamp: u64,
    /// Vote.
    pub vote: Vote,
}

/// Typed operations over a [`Provider`].
#[derive(Clone)]
pub struct Driver {
    provider: Arc<dyn Provider>,
    eth: Option<Arc<dyn EthRpc>>,
}

impl Driver {
    /// Wraps a provider.
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Driver { provider, eth: None }
    }

    /// Reaches networks' EVM endpoints through `rpc`, enabling typed-data
    /// signatures and chain ID lookups.
    pub fn with_eth_rpc(mut self, rpc: Arc<dyn EthRpc>) -> Self {
        self.eth = Some(rpc);
        self
    }

    /// Whether backups can be encrypted with this provider.
    pub fn can_encrypt(&self) -> bool {
        self.provider.supports_encryption()
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, Error> {
        debug!(method, "provider request");
        self.provider
            .request(method, params)
            .await
            .map_err(check_error)
    }

    /// Addresses the wallet exposes.
    pub async fn accounts(&self) -> Result<Vec<String>, Error> {
        let value = self.request("eth_accounts", json!([])).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Chain the wallet is connected to.
    pub async fn chain_id(&self) -> Result<String, Error> {
        let value = self.request("eth_chainId", json!([])).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Signs `message` as `address`, with `personal_sign` when asked for and
    /// available, otherwise with `eth_sign`.
    pub async fn sign_eth_message(
        &self,
        address: &str,
        message: EthMessage<'_>,
        personal: bool,
    ) -> Result<Vec<u8>, Error> {
        let message = message.to_param();
        let value = if personal && self.provider.supports_personal_sign() {
            self.request("personal_sign", json!([message, address])).await?
        } else {
            self.request("eth_sign", json!([address, message])).await?
        };
        decode_signature(&value)
    }

    fn require_encryption(&self) -> Result<(), Error> {
        if self.can_encrypt() {
            Ok(())
        } else {
            Err(Error::EncryptionUnsupported)
        }
    }

    /// Encrypts `plaintext` to the wallet's encryption key for `address`.
    pub async fn encrypt(&self, address: &str, plaintext: &str) -> Result<EncryptedData, Error> {
        self.require_encryption()?;
        let value = self
            .request("eth_getEncryptionPublicKey", json!([address]))
            .await?;
        let key = value.as_str().ok_or_else(|| Error::Provider {
            code: None,
            message: "encryption key is not a string".to_string(),
        })?;
        let key = base64_key(key)?;
        sealed::seal(&key, plaintext.as_bytes())
    }

    /// Asks the wallet to decrypt an envelope addressed to `address`.
    pub async fn decrypt(&self, address: &str, data: &EncryptedData) -> Result<String, Error> {
        self.require_encryption()?;
        let value = self
            .request("eth_decrypt", json!([data.to_hex_json()?, address]))
            .await?;
        match value {
            Value::String(s) => Ok(s),
            _ => Err(Error::UserRejected),
        }
    }

    /// Signs `txn` with the key in `opts`.
    ///
    /// The header initiator is set to the metadata hash when it is empty.
    /// On networks with an EVM endpoint the wallet signs the EIP-712 typed
    /// data the endpoint builds for the transaction. Otherwise it blind-signs
    /// `sha256(sha256(metadata) ‖ txn.hash())` with `eth_sign`.
    pub async fn sign_accumulate(
        &self,
        network: &Network,
        txn: &mut Transaction,
        opts: &SignOptions,
    ) -> Result<Signature, Error> {
        let endpoint = network.eth.first();
        let mut signature = Signature {
            kind: opts.public_key.signature_type(),
            public_key: opts.public_key.public_key().to_vec(),
            signature: Vec::new(),
            signer: opts.signer.clone(),
            signer_version: opts.signer_version,
            timestamp: opts.timestamp,
            vote: opts.vote,
            transaction_hash: None,
            memo: None,
            data: None,
            chain_id: None,
        };
        if let Some(endpoint) = endpoint {
            signature.kind = SignatureType::TypedData;
            signature.chain_id = Some(self.eth_chain_id(endpoint).await?);
        }
        let metadata = signature.metadata_hash()?;
        if txn.header.initiator == [0u8; 32] {
            txn.header.initiator = metadata;
        }
        let txn_hash = txn.hash()?;
        let address = opts.public_key.ethereum();
        signature.signature = match endpoint {
            Some(endpoint) => {
                let typed = self
                    .eth_rpc()?
                    .call(
                        endpoint,
                        "acc_typedData",
                        json!({ "transaction": txn, "signature": signature.metadata() }),
                    )
                    .await?;
                self.sign_typed_data(&address, &typed).await?
            }
            None => {
                let hash = sha256_pair(&metadata, &txn_hash);
                self.sign_eth_message(&address, EthMessage::Bytes(&hash), false)
                    .await?
            }
        };
        signature.transaction_hash = Some(txn_hash);
        Ok(signature)
    }

    /// Signs EIP-712 `typed` data as `address` with `eth_signTypedData_v4`.
    pub async fn sign_typed_data(&self, address: &str, typed: &Value) -> Result<Vec<u8>, Error> {
        let value = self
            .request("eth_signTypedData_v4", json!([address, typed.to_string()]))
            .await?;
        decode_signature(&value)
    }

    fn eth_rpc(&self) -> Result<&Arc<dyn EthRpc>, Error> {
        self.eth
            .as_ref()
            .ok_or_else(|| Error::EthRpc("no client for the network's EVM endpoint".to_string()))
    }

    /// Chain ID reported by an EVM endpoint.
    async fn eth_chain_id(&self, endpoint: &str) -> Result<u64, Error> {
        let value = self.eth_rpc()?.call(endpoint, "eth_chainId", json!([])).await?;
        value
            .as_str()
            .and_then(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16).ok())
            .ok_or_else(|| Error::EthRpc(format!("unable to resolve chain ID from {}", value)))
    }

    /// Configured chain ID, or the one of the network's first EVM endpoint.
    async fn resolve_chain_id(&self, network: &Network) -> Option<String> {
        if let Some(id) = &network.chain_id {
            return Some(id.clone());
        }
        let endpoint = network.eth.first()?;
        match self.eth_chain_id(endpoint).await {
            Ok(id) => Some(format!("0x{:x}", id)),
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "failed to resolve chain ID");
                None
            }
        }
    }

    /// Points the wallet at the network's EVM endpoint. Failures are logged and ignored.
    /// Nothing happens when the chain ID is neither configured nor resolvable.
    pub async fn switch_chains(&self, network: &Network) {
        let chain_id = match self.resolve_chain_id(network).await {
            Some(id) => id,
            None => return,
        };
        let switch = json!([{ "chainId": chain_id }]);
        match self.provider.request("wallet_switchEthereumChain", switch.clone()).await {
            Ok(_) => {}
            Err(e) if e.code == Some(UNRECOGNIZED_CHAIN) => {}
            Err(e) => {
                warn!(code = ?e.code, message = %e.message, "failed to switch chains");
                return;
            }
        }
        let add = json!([{
            "blockExplorerUrls": [network.explorer],
            "nativeCurrency": { "name": "ACME", "symbol": "ACME", "decimals": 18 },
            "rpcUrls": network.eth,
            "chainId": chain_id,
            "chainName": format!("Accumulate {}", network.label),
        }]);
        if let Err(e) = self.provider.request("wallet_addEthereumChain", add).await {
            warn!(code = ?e.code, message = %e.message, "failed to add chain");
            return;
        }
        if let Err(e) = self.provider.request("wallet_switchEthereumChain", switch).await {
            warn!(code = ?e.code, message = %e.message, "failed to switch chains");
        }
    }
}

/// A `0x`-prefixed hex signature. Anything else means the wallet declined.
fn decode_signature(value: &Value) -> Result<Vec<u8>, Error> {
    match value.as_str() {
        Some(sig) if !sig.is_empty() => hex::decode(sig.trim_start_matches("0x")).map_err(|e| Error::Provider {
            code: None,
            message: format!("signature is not hex: {}", e),
        }),
        _ => Err(Error::UserRejected),
    }
}

fn base64_key(key: &str) -> Result<Vec<u8>, Error> {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD
        .decode(key)
        .map_err(|e| Error::Provider {
            code: None,
            message: format!("encryption key is not base64: {}", e),
        })
}

/// Maps a provider error onto the crate's error kinds.
pub fn check_error(error: ProviderError) -> Error {
    if error.code == Some(USER_REJECTED) || error.cause_code == Some(USER_REJECTED) {
        return Error::UserRejected;
    }
    let status = error.status_code.or_else(|| ledger_status(&error.message));
    match status {
        Some(0x6d02) | Some(0x6511) => Error::LedgerAppNotRunning,
        Some(0x530c) | Some(0x6b0c) | Some(0x5515) => Error::LedgerLocked,
        _ => Error::Provider {
            code: error.code,
            message: error.message,
        },
    }
}

/// Status code of a `"Ledger device: ...\n{json}"` message.
fn ledger_status(message: &str) -> Option<u64> {
    if !message.starts_with(LEDGER_PREFIX) {
        return None;
    }
    let json = &message[message.find('\n')? + 1..];
    let value: Value = serde_json::from_str(json).ok()?;
    value.get("originalError")?.get("statusCode")?.as_u64()
}
