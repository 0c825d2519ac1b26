#![deny(missing_docs)]

//! SHA-256 merkle roots in the cascading form used by the Accumulate protocol.
//!
//! Items are appended one by one. Each level keeps at most one pending
//! hash; appending to a full level combines the two and carries the
//! result upward. The root folds the pending hashes from low to high.
use sha2::{Digest, Sha256};
use std::fmt;

/// Merkle hash of a node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Hash(pub [u8; 32]);

/// Merkle tree of hashes with a given size.
pub struct MerkleTree;

/// Efficient builder of the merkle root.
/// See `MerkleTree::build_root`
#[derive(Clone, Debug, Default)]
pub struct MerkleRootBuilder {
    roots: Vec<Option<Hash>>,
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", hex::encode(self.0))
    }
}

impl Hash {
    /// SHA-256 of the given bytes.
    pub fn digest(data: &[u8]) -> Hash {
        Hash(Sha256::digest(data).into())
    }

    /// Hash of the node whose children are `left` and `right`.
    pub fn combine(&self, right: &Hash) -> Hash {
        let mut h = Sha256::new();
        h.update(self.0);
        h.update(right.0);
        Hash(h.finalize().into())
    }
}

impl MerkleTree {
    /// Builds and returns the root hash of a Merkle tree whose leaves are
    /// the SHA-256 hashes of the supplied items.
    /// Returns `None` for an empty list.
    pub fn root<I, T>(list: I) -> Option<Hash>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        list.into_iter()
            .fold(Self::build_root(), |mut builder, item| {
                builder.append(item.as_ref());
                builder
            })
            .root()
    }

    /// Prepares a root builder to compute the root iteratively.
    pub fn build_root() -> MerkleRootBuilder {
        MerkleRootBuilder { roots: Vec::new() }
    }

    /// Connects roots of perfect binary trees, enumerated from low to high,
    /// into a merkle root of an imperfect tree.
    pub fn connect_perfect_roots(roots: impl IntoIterator<Item = Hash>) -> Option<Hash> {
        roots.into_iter().fold(None, |maybe_current, root| {
            maybe_current
                .map(|curr| root.combine(&curr))
                .or(Some(root))
        })
    }
}

impl MerkleRootBuilder {
    /// Appends an item to the merkle tree, hashing it first.
    pub fn append(&mut self, item: &[u8]) {
        self.append_hash(Hash::digest(item))
    }

    /// Appends an already hashed leaf.
    pub fn append_hash(&mut self, leaf: Hash) {
        let mut level = 0usize;
        let mut current_hash = leaf;
        while self.roots.len() > level {
            if let Some(left_hash) = self.roots[level].take() {
                // Slot is liberated via Option::take() and the sum moves up a level.
                current_hash = left_hash.combine(&current_hash);
            } else {
                self.roots[level] = Some(current_hash);
                return;
            }
            level += 1;
        }
        self.roots.push(Some(current_hash));
    }

    /// Compute the merkle root, `None` if nothing was appended.
    pub fn root(&self) -> Option<Hash> {
        MerkleTree::connect_perfect_roots(self.roots.iter().filter_map(|r| *r))
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Hash> for [u8; 32] {
    fn from(h: Hash) -> Self {
        h.0
    }
}
