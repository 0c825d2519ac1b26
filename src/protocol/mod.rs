//! Accumulate protocol objects: accounts, data entries, transactions and signatures.
mod account;
mod data_entry;
mod signature;
mod transaction;

pub use account::*;
pub use data_entry::*;
pub use signature::*;
pub use transaction::*;

/// Serde helper for lists of byte strings written as hex.
pub(crate) mod hex_parts {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(parts: &[Vec<u8>], s: S) -> Result<S::Ok, S::Error> {
        let hex: Vec<String> = parts.iter().map(hex::encode).collect();
        hex.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Vec<u8>>, D::Error> {
        let hex = Vec::<String>::deserialize(d)?;
        hex.iter()
            .map(|h| hex::decode(h).map_err(serde::de::Error::custom))
            .collect()
    }
}
