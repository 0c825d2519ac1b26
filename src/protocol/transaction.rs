use super::DataEntry;
use crate::hash::{sha256, sha256_pair};
use crate::url::Url;
use readerwriter::{Encodable, FieldWriter, WriteError, Writer};
use serde::{Deserialize, Serialize};

/// Credits are quoted with two decimals.
pub const CREDIT_PRECISION: u128 = 100;

/// ACME token amounts carry eight decimals.
pub const ACME_PRECISION: u128 = 100_000_000;

/// Transaction header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionHeader {
    /// Account the transaction executes on.
    pub principal: Url,
    /// Hash of the initiating signature's metadata.
    #[serde(default, with = "hex::serde", skip_serializing_if = "is_zero")]
    pub initiator: [u8; 32],
    /// Free-form memo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    /// Opaque metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Vec<u8>>,
}

fn is_zero(h: &[u8; 32]) -> bool {
    h.iter().all(|b| *b == 0)
}

/// A transaction as signed and submitted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Header.
    pub header: TransactionHeader,
    /// Body.
    pub body: TransactionBody,
}

/// Transaction bodies this crate builds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TransactionBody {
    /// Append a data entry to the principal.
    WriteData(WriteData),
    /// Append a data entry to a lite data account.
    WriteDataTo(WriteDataTo),
    /// Transfer tokens.
    SendTokens(SendTokens),
    /// Convert tokens into credits.
    AddCredits(AddCredits),
}

/// Body of a write-data transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteData {
    /// Entry to write.
    pub entry: DataEntry,
    /// Write to the scratch chain.
    #[serde(default)]
    pub scratch: bool,
    /// Also record the entry in the account state.
    #[serde(default)]
    pub write_to_state: bool,
}

/// Body of a write-data-to transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteDataTo {
    /// Lite data account to write to.
    pub recipient: Url,
    /// Entry to write.
    pub entry: DataEntry,
}

/// Body of a send-tokens transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendTokens {
    /// Recipients.
    pub to: Vec<TokenRecipient>,
}

/// One output of a send-tokens transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecipient {
    /// Receiving token account.
    pub url: Url,
    /// Amount in the token's smallest unit.
    pub amount: u64,
}

/// Body of an add-credits transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddCredits {
    /// Lite identity or key page receiving the credits.
    pub recipient: Url,
    /// ACME spent, eight decimals.
    pub amount: u64,
    /// Oracle price the amount was computed with.
    pub oracle: u64,
}

impl Transaction {
    /// Creates a transaction with an empty initiator.
    pub fn new(principal: Url, body: TransactionBody) -> Self {
        Transaction {
            header: TransactionHeader {
                principal,
                initiator: [0u8; 32],
                memo: None,
                metadata: None,
            },
            body,
        }
    }

    /// Writes `entry` to the data account `principal`.
    pub fn write_data(principal: Url, entry: DataEntry) -> Self {
        Self::new(
            principal,
            TransactionBody::WriteData(WriteData {
                entry,
                scratch: false,
                write_to_state: false,
            }),
        )
    }

    /// Writes `entry` to the lite data account `recipient`, paid for by `principal`.
    pub fn write_data_to(principal: Url, recipient: Url, entry: DataEntry) -> Self {
        Self::new(principal, TransactionBody::WriteDataTo(WriteDataTo { recipient, entry }))
    }

    /// Sends `amount` from the token account `principal` to `to`.
    pub fn send_tokens(principal: Url, to: Url, amount: u64) -> Self {
        Self::new(
            principal,
            TransactionBody::SendTokens(SendTokens {
                to: vec![TokenRecipient { url: to, amount }],
            }),
        )
    }

    /// Buys `credits` (whole credits) for `recipient`, paying from `principal`.
    /// `oracle` is the network's oracle price, one ACME buying `oracle / 100` credits.
    pub fn add_credits(principal: Url, recipient: Url, credits: u64, oracle: u64) -> Self {
        let oracle = oracle.max(1);
        let amount = credits as u128 * CREDIT_PRECISION * ACME_PRECISION / oracle as u128;
        let amount = u64::try_from(amount).unwrap_or(u64::MAX);
        Self::new(
            principal,
            TransactionBody::AddCredits(AddCredits {
                recipient,
                amount,
                oracle,
            }),
        )
    }

    /// Transaction hash: the header hash combined with the body hash.
    pub fn hash(&self) -> Result<[u8; 32], WriteError> {
        let header = sha256(self.header.encode_to_vec()?);
        Ok(sha256_pair(&header, &self.body.hash()?))
    }
}

impl TransactionBody {
    const TYPE_SEND_TOKENS: u64 = 0x03;
    const TYPE_WRITE_DATA: u64 = 0x05;
    const TYPE_WRITE_DATA_TO: u64 = 0x06;
    const TYPE_ADD_CREDITS: u64 = 0x0e;

    /// Body hash. Data writes hash the entry separately from the rest of the body.
    pub fn hash(&self) -> Result<[u8; 32], WriteError> {
        let entry = match self {
            TransactionBody::WriteData(b) => &b.entry,
            TransactionBody::WriteDataTo(b) => &b.entry,
            _ => return Ok(sha256(self.encode_to_vec()?)),
        };
        let mut without_entry = Vec::new();
        self.encode_fields(&mut without_entry, false)?;
        Ok(sha256_pair(&sha256(without_entry), &entry.hash()))
    }

    /// The data entry written by this body, if any.
    pub fn data_entry(&self) -> Option<&DataEntry> {
        match self {
            TransactionBody::WriteData(b) => Some(&b.entry),
            TransactionBody::WriteDataTo(b) => Some(&b.entry),
            _ => None,
        }
    }

    fn encode_fields(&self, w: &mut impl Writer, with_entry: bool) -> Result<(), WriteError> {
        let mut f = FieldWriter::new(w);
        match self {
            TransactionBody::WriteData(b) => {
                f.enumeration(1, Self::TYPE_WRITE_DATA)?;
                if with_entry {
                    f.value(2, &b.entry)?;
                }
                f.boolean(3, b.scratch)?;
                f.boolean(4, b.write_to_state)?;
            }
            TransactionBody::WriteDataTo(b) => {
                f.enumeration(1, Self::TYPE_WRITE_DATA_TO)?;
                f.string(2, &b.recipient.to_string())?;
                if with_entry {
                    f.value(3, &b.entry)?;
                }
            }
            TransactionBody::SendTokens(b) => {
                f.enumeration(1, Self::TYPE_SEND_TOKENS)?;
                f.repeated_values(4, &b.to)?;
            }
            TransactionBody::AddCredits(b) => {
                f.enumeration(1, Self::TYPE_ADD_CREDITS)?;
                f.string(2, &b.recipient.to_string())?;
                f.big_uint(3, b.amount.into())?;
                f.uint(4, b.oracle)?;
            }
        }
        f.finish()
    }
}

impl Encodable for TransactionBody {
    fn encode(&self, w: &mut impl Writer) -> Result<(), WriteError> {
        self.encode_fields(w, true)
    }
}

impl Encodable for TokenRecipient {
    fn encode(&self, w: &mut impl Writer) -> Result<(), WriteError> {
        let mut f = FieldWriter::new(w);
        f.string(1, &self.url.to_string())?;
        f.big_uint(2, self.amount.into())?;
        f.finish()
    }
}

impl Encodable for TransactionHeader {
    fn encode(&self, w: &mut impl Writer) -> Result<(), WriteError> {
        let mut f = FieldWriter::new(w);
        f.string(1, &self.principal.to_string())?;
        f.hash(2, &self.initiator)?;
        if let Some(memo) = &self.memo {
            f.string(3, memo)?;
        }
        if let Some(metadata) = &self.metadata {
            f.bytes(4, metadata)?;
        }
        f.finish()
    }
}

impl Encodable for Transaction {
    fn encode(&self, w: &mut impl Writer) -> Result<(), WriteError> {
        let mut f = FieldWriter::new(w);
        f.value(1, &self.header)?;
        f.value(2, &self.body)?;
        f.finish()
    }
}
