use crate::{WriteError, Writer};

/// Marker byte written in place of an object that has no fields.
pub const EMPTY_OBJECT: u8 = 0x80;

/// Highest field number an object may use.
pub const MAX_FIELD: u32 = 32;

/// A trait for encoding structures using the [Writer] trait.
pub trait Encodable {
    /// Encodes receiver into bytes appending them to a provided buffer.
    fn encode(&self, w: &mut impl Writer) -> Result<(), WriteError>;

    /// Encodes receiver into a vector of bytes.
    fn encode_to_vec(&self) -> Result<Vec<u8>, WriteError> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        Ok(buf)
    }
}

impl<T: Encodable + ?Sized> Encodable for &T {
    fn encode(&self, w: &mut impl Writer) -> Result<(), WriteError> {
        (**self).encode(w)
    }
}

/// Writes the numbered fields of a single object.
///
/// Every method skips zero values, except the `repeated` variants which
/// write each element even when it is empty. Call [`FieldWriter::finish`]
/// once all fields are written.
pub struct FieldWriter<'w, W: Writer> {
    w: &'w mut W,
    written: bool,
}

impl<'w, W: Writer> FieldWriter<'w, W> {
    /// Starts writing an object into `w`.
    pub fn new(w: &'w mut W) -> Self {
        FieldWriter { w, written: false }
    }

    fn field(&mut self, n: u32) -> Result<(), WriteError> {
        if n == 0 || n > MAX_FIELD {
            return Err(WriteError::FieldOutOfRange(n));
        }
        self.written = true;
        self.w.write_uvarint(b"field", n as u64)
    }

    /// Writes an unsigned integer field.
    pub fn uint(&mut self, n: u32, x: u64) -> Result<(), WriteError> {
        if x == 0 {
            return Ok(());
        }
        self.field(n)?;
        self.w.write_uvarint(b"uint", x)
    }

    /// Writes a signed integer field.
    pub fn int(&mut self, n: u32, x: i64) -> Result<(), WriteError> {
        if x == 0 {
            return Ok(());
        }
        self.field(n)?;
        self.w.write_varint(b"int", x)
    }

    /// Writes an enumeration value.
    pub fn enumeration(&mut self, n: u32, x: u64) -> Result<(), WriteError> {
        self.uint(n, x)
    }

    /// Writes a boolean field. `false` is omitted.
    pub fn boolean(&mut self, n: u32, x: bool) -> Result<(), WriteError> {
        self.uint(n, x as u64)
    }

    /// Writes a length-prefixed byte string.
    pub fn bytes(&mut self, n: u32, x: &[u8]) -> Result<(), WriteError> {
        if x.is_empty() {
            return Ok(());
        }
        self.field(n)?;
        self.w.write_length_prefixed(b"bytes", x)
    }

    /// Writes each element of a repeated byte-string field.
    pub fn repeated_bytes<B: AsRef<[u8]>>(&mut self, n: u32, xs: &[B]) -> Result<(), WriteError> {
        for x in xs {
            self.field(n)?;
            self.w.write_length_prefixed(b"bytes", x.as_ref())?;
        }
        Ok(())
    }

    /// Writes a string field.
    pub fn string(&mut self, n: u32, x: &str) -> Result<(), WriteError> {
        self.bytes(n, x.as_bytes())
    }

    /// Writes a 32-byte hash without a length prefix. An all-zero hash is omitted.
    pub fn hash(&mut self, n: u32, x: &[u8; 32]) -> Result<(), WriteError> {
        if x.iter().all(|b| *b == 0) {
            return Ok(());
        }
        self.field(n)?;
        self.w.write(b"hash", x)
    }

    /// Writes an arbitrary precision unsigned integer as big-endian bytes.
    pub fn big_uint(&mut self, n: u32, x: u128) -> Result<(), WriteError> {
        let bytes = x.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        self.bytes(n, &bytes[skip..])
    }

    /// Writes a nested object, length-prefixed.
    pub fn value(&mut self, n: u32, x: &impl Encodable) -> Result<(), WriteError> {
        let buf = x.encode_to_vec()?;
        self.field(n)?;
        self.w.write_length_prefixed(b"value", &buf)
    }

    /// Writes each element of a repeated nested-object field.
    pub fn repeated_values<T: Encodable>(&mut self, n: u32, xs: &[T]) -> Result<(), WriteError> {
        for x in xs {
            self.value(n, x)?;
        }
        Ok(())
    }

    /// Completes the object, writing the empty-object marker if no field was written.
    pub fn finish(self) -> Result<(), WriteError> {
        if self.written {
            Ok(())
        } else {
            self.w.write_u8(b"empty", EMPTY_OBJECT)
        }
    }
}
