//! Composite key encoding.
//!
//! Strings are written as a big-endian `u16` length followed by the bytes; integers are written
//! fixed-width big-endian. Both encodings keep byte order aligned with field order, so a key
//! built from the first `n` fields is a prefix of every key sharing those fields.

use crate::errors::{DbError, DbResult};

/// Builder for a composite key body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyBuf(Vec<u8>);

impl KeyBuf {
    /// Creates an empty key.
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends a length-prefixed string component.
    pub fn str(mut self, s: &str) -> DbResult<Self> {
        let len = u16::try_from(s.len()).map_err(|_| DbError::KeyTooLong(s.len()))?;
        self.0.extend_from_slice(&len.to_be_bytes());
        self.0.extend_from_slice(s.as_bytes());
        Ok(self)
    }

    /// Appends a fixed-width integer component.
    pub fn u64(mut self, n: u64) -> Self {
        self.0.extend_from_slice(&n.to_be_bytes());
        self
    }

    /// Returns the encoded bytes.
    pub fn finish(self) -> Vec<u8> {
        self.0
    }
}

/// Cursor that decodes a key body written by [`KeyBuf`].
#[derive(Debug)]
pub struct KeyReader<'a> {
    bytes: &'a [u8],
}

impl<'a> KeyReader<'a> {
    /// Creates a reader over `bytes`.
    pub const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    fn take(&mut self, n: usize) -> DbResult<&'a [u8]> {
        if self.bytes.len() < n {
            return Err(DbError::failed_to_unpack_key(format!(
                "wanted {n} bytes, {} left",
                self.bytes.len()
            )));
        }

        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Ok(head)
    }

    /// Reads a length-prefixed string component.
    pub fn str(&mut self) -> DbResult<String> {
        let len = self.take(2)?;
        let len = u16::from_be_bytes([len[0], len[1]]) as usize;
        let raw = self.take(len)?;

        String::from_utf8(raw.to_vec()).map_err(DbError::failed_to_unpack_key)
    }

    /// Reads a fixed-width integer component.
    pub fn u64(&mut self) -> DbResult<u64> {
        let raw = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(raw);
        Ok(u64::from_be_bytes(buf))
    }

    /// Fails unless every byte has been consumed.
    pub fn finish(self) -> DbResult<()> {
        if !self.bytes.is_empty() {
            return Err(DbError::failed_to_unpack_key(format!(
                "{} trailing bytes",
                self.bytes.len()
            )));
        }

        Ok(())
    }
}
