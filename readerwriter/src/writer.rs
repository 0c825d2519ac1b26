use core::mem;
use thiserror::Error;

/// Errors raised while encoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    /// The destination buffer has no room for the value.
    #[error("insufficient capacity")]
    InsufficientCapacity,

    /// Field numbers must be within `1..=32`.
    #[error("field number {0} is out of range")]
    FieldOutOfRange(u32),
}

/// Interface for writing binary data.
pub trait Writer {
    /// Writes bytes with the given label. If there is no sufficient capacity,
    /// performs no modifications and returns WriteError::InsufficientCapacity.
    fn write(&mut self, label: &'static [u8], src: &[u8]) -> Result<(), WriteError>;

    /// Remaining number of bytes that can be written.
    fn remaining_capacity(&self) -> usize;

    /// Writes a single byte.
    #[inline]
    fn write_u8(&mut self, label: &'static [u8], x: u8) -> Result<(), WriteError> {
        self.write(label, &[x])
    }

    /// Writes an unsigned LEB128 integer.
    fn write_uvarint(&mut self, label: &'static [u8], mut x: u64) -> Result<(), WriteError> {
        let mut buf = [0u8; 10];
        let mut n = 0;
        while x >= 0x80 {
            buf[n] = (x as u8) | 0x80;
            x >>= 7;
            n += 1;
        }
        buf[n] = x as u8;
        self.write(label, &buf[..=n])
    }

    /// Writes a signed integer with zig-zag encoding.
    #[inline]
    fn write_varint(&mut self, label: &'static [u8], x: i64) -> Result<(), WriteError> {
        self.write_uvarint(label, ((x << 1) ^ (x >> 63)) as u64)
    }

    /// Writes a uvarint length followed by the bytes.
    fn write_length_prefixed(&mut self, label: &'static [u8], src: &[u8]) -> Result<(), WriteError> {
        self.write_uvarint(label, src.len() as u64)?;
        self.write(label, src)
    }
}

impl Writer for Vec<u8> {
    #[inline]
    fn write(&mut self, _label: &'static [u8], src: &[u8]) -> Result<(), WriteError> {
        self.extend_from_slice(src);
        Ok(())
    }

    #[inline]
    fn write_u8(&mut self, _label: &'static [u8], x: u8) -> Result<(), WriteError> {
        self.push(x);
        Ok(())
    }

    #[inline]
    fn remaining_capacity(&self) -> usize {
        usize::max_value()
    }
}

impl Writer for &mut [u8] {
    #[inline]
    fn write(&mut self, _label: &'static [u8], src: &[u8]) -> Result<(), WriteError> {
        let n = src.len();
        if n <= self.remaining_capacity() {
            let (a, b) = mem::take(self).split_at_mut(n);
            a.copy_from_slice(&src[..n]);
            *self = b;
            Ok(())
        } else {
            Err(WriteError::InsufficientCapacity)
        }
    }

    #[inline]
    fn remaining_capacity(&self) -> usize {
        self.len()
    }
}
