use super::hex_parts;
use crate::hash::sha256;
use merkle::MerkleTree;
use readerwriter::{Encodable, FieldWriter, WriteError, Writer};
use serde::{Deserialize, Serialize};

/// Payload of a write-data transaction: an ordered list of byte-string parts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DataEntry {
    /// Entry hashed with a single merkle root.
    Accumulate {
        /// Parts.
        #[serde(with = "hex_parts")]
        data: Vec<Vec<u8>>,
    },
    /// Entry whose merkle root is hashed once more.
    DoubleHash {
        /// Parts.
        #[serde(with = "hex_parts")]
        data: Vec<Vec<u8>>,
    },
}

impl DataEntry {
    const TYPE_ACCUMULATE: u64 = 2;
    const TYPE_DOUBLE_HASH: u64 = 3;

    /// Creates a double-hash entry.
    pub fn double_hash(data: Vec<Vec<u8>>) -> Self {
        DataEntry::DoubleHash { data }
    }

    /// The parts in order.
    pub fn parts(&self) -> &[Vec<u8>] {
        match self {
            DataEntry::Accumulate { data } | DataEntry::DoubleHash { data } => data,
        }
    }

    /// Part `i`, if present and non-empty.
    pub fn part(&self, i: usize) -> Option<&[u8]> {
        self.parts()
            .get(i)
            .map(Vec::as_slice)
            .filter(|p| !p.is_empty())
    }

    /// Entry hash as computed by the network.
    pub fn hash(&self) -> [u8; 32] {
        let root = MerkleTree::root(self.parts()).map(<[u8; 32]>::from);
        match self {
            DataEntry::Accumulate { .. } => root.unwrap_or_default(),
            DataEntry::DoubleHash { .. } => match root {
                Some(root) => sha256(root),
                None => sha256(b""),
            },
        }
    }

    fn type_code(&self) -> u64 {
        match self {
            DataEntry::Accumulate { .. } => Self::TYPE_ACCUMULATE,
            DataEntry::DoubleHash { .. } => Self::TYPE_DOUBLE_HASH,
        }
    }
}

impl Encodable for DataEntry {
    fn encode(&self, w: &mut impl Writer) -> Result<(), WriteError> {
        let mut f = FieldWriter::new(w);
        f.enumeration(1, self.type_code())?;
        f.repeated_bytes(2, self.parts())?;
        f.finish()
    }
}
