use super::Transaction;
use crate::hash::sha256;
use crate::url::Url;
use readerwriter::{Encodable, FieldWriter, WriteError, Writer};
use serde::{Deserialize, Serialize};

/// Signature schemes. Only Ethereum-style secp256k1 keys are produced here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SignatureType {
    /// secp256k1 key hashed the Ethereum way, signing a blind hash.
    Eth,
    /// secp256k1 key signing EIP-712 typed data.
    TypedData,
}

impl SignatureType {
    /// Wire code.
    pub fn code(self) -> u64 {
        match self {
            SignatureType::Eth => 10,
            SignatureType::TypedData => 16,
        }
    }
}

/// How a signer votes on a transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Vote {
    /// Approve.
    #[default]
    Accept,
    /// Disapprove.
    Reject,
    /// Neither.
    Abstain,
}

impl Vote {
    fn code(self) -> u64 {
        match self {
            Vote::Accept => 0,
            Vote::Reject => 1,
            Vote::Abstain => 2,
        }
    }
}

/// A key signature over a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    /// Scheme.
    #[serde(rename = "type")]
    pub kind: SignatureType,
    /// Uncompressed public key.
    #[serde(with = "hex::serde")]
    pub public_key: Vec<u8>,
    /// r‖s‖v, empty until signed.
    #[serde(default, with = "hex::serde")]
    pub signature: Vec<u8>,
    /// Key page or lite identity the key belongs to.
    pub signer: Url,
    /// Version of the signer.
    pub signer_version: u64,
    /// Milliseconds since the epoch.
    pub timestamp: u64,
    /// Vote.
    #[serde(default)]
    pub vote: Vote,
    /// Hash of the signed transaction, set once signed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<[u8; 32]>,
    /// Memo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    /// Opaque data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
    /// EVM chain of a typed-data signature.
    #[serde(default, rename = "chainID", skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
}

impl Signature {
    /// Signature metadata: everything except the signature bytes and transaction hash.
    pub fn metadata(&self) -> Signature {
        Signature {
            signature: Vec::new(),
            transaction_hash: None,
            ..self.clone()
        }
    }

    /// Hash of the encoded metadata.
    pub fn metadata_hash(&self) -> Result<[u8; 32], WriteError> {
        Ok(sha256(self.metadata().encode_to_vec()?))
    }
}

impl Encodable for Signature {
    fn encode(&self, w: &mut impl Writer) -> Result<(), WriteError> {
        let mut f = FieldWriter::new(w);
        f.enumeration(1, self.kind.code())?;
        f.bytes(2, &self.public_key)?;
        f.bytes(3, &self.signature)?;
        f.string(4, &self.signer.to_string())?;
        f.uint(5, self.signer_version)?;
        f.uint(6, self.timestamp)?;
        f.enumeration(7, self.vote.code())?;
        if let Some(hash) = &self.transaction_hash {
            f.hash(8, hash)?;
        }
        if let Some(memo) = &self.memo {
            f.string(9, memo)?;
        }
        if let Some(data) = &self.data {
            f.bytes(10, data)?;
        }
        if let Some(chain_id) = self.chain_id {
            f.big_uint(11, chain_id.into())?;
        }
        f.finish()
    }
}

/// Signed transactions ready for submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Transactions.
    pub transaction: Vec<Transaction>,
    /// Signatures over them.
    pub signatures: Vec<Signature>,
}
