//! Canonical binary encoding of Accumulate protocol objects.
//!
//! Objects are written as a sequence of numbered fields. Each field starts
//! with its number (1 through 32) as a uvarint, followed by the value.
//! Fields holding zero values are omitted and an object with no fields at
//! all is written as a single [`EMPTY_OBJECT`] byte.
mod codable;
mod writer;

pub use codable::{Encodable, FieldWriter, EMPTY_OBJECT, MAX_FIELD};
pub use writer::{WriteError, Writer};
