//! Low-level byte plumbing for the `.mrsl` encoding.
//!
//! The file is `magic || version || sections`, each section
//! `tag(1B) || length(u32 BE) || payload`. Hashes are raw 32 bytes,
//! integers big-endian, strings UTF-8 with a `u32` length prefix. Two
//! writers handed the same logical morsel must produce identical bytes, so
//! sections appear in strictly ascending tag order, empty optional sections
//! are omitted, and every keyed list is sorted ascending.

use sldg_core::hash::{HASH_WIDTH, LedgerHash};

use crate::error::MorselError;

/// The four magic bytes opening every morsel file.
pub const MAGIC: [u8; 4] = *b"mrsl";
/// The encoding version this implementation reads and writes.
pub const VERSION: u16 = 1;

/// Section tag: declared state (required).
pub const TAG_STATE: u8 = 0x01;
/// Section tag: row set (required).
pub const TAG_ROWS: u8 = 0x02;
/// Section tag: source rows.
pub const TAG_SOURCES: u8 = 0x03;
/// Section tag: crumtrails.
pub const TAG_TRAILS: u8 = 0x04;
/// Section tag: descriptive metadata.
pub const TAG_META: u8 = 0x05;
/// Section tag: opaque asset blob.
pub const TAG_ASSETS: u8 = 0x06;

/// Truncation-checked reader over a section payload.
pub struct SectionReader<'a> {
    section: &'static str,
    data: &'a [u8],
}

impl<'a> SectionReader<'a> {
    /// Wrap a payload; `section` names it in errors.
    #[must_use]
    pub const fn new(section: &'static str, data: &'a [u8]) -> Self {
        Self { section, data }
    }

    /// The section name used in errors.
    #[must_use]
    pub const fn section(&self) -> &'static str {
        self.section
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.data.len()
    }

    /// A format error in this section.
    #[must_use]
    pub fn bad(&self, detail: impl Into<String>) -> MorselError {
        MorselError::Format {
            section: self.section,
            detail: detail.into(),
        }
    }

    /// Consume `len` raw bytes.
    ///
    /// # Errors
    /// [`MorselError::Format`] on truncation.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8], MorselError> {
        let (head, rest) = self
            .data
            .split_at_checked(len)
            .ok_or_else(|| self.bad(format!("truncated: needed {len} more bytes")))?;
        self.data = rest;
        Ok(head)
    }

    /// Consume a fixed-width array.
    ///
    /// # Errors
    /// [`MorselError::Format`] on truncation.
    pub fn take_array<const N: usize>(&mut self) -> Result<[u8; N], MorselError> {
        let slice = self.take(N)?;
        slice
            .try_into()
            .map_err(|_| unreachable!("take returns exactly N bytes"))
    }

    /// Consume a 32-byte hash.
    ///
    /// # Errors
    /// [`MorselError::Format`] on truncation.
    pub fn take_hash(&mut self) -> Result<LedgerHash, MorselError> {
        Ok(LedgerHash::new(self.take_array::<HASH_WIDTH>()?))
    }

    /// Consume a big-endian `u64`.
    ///
    /// # Errors
    /// [`MorselError::Format`] on truncation.
    pub fn take_u64(&mut self) -> Result<u64, MorselError> {
        Ok(u64::from_be_bytes(self.take_array::<8>()?))
    }

    /// Consume a big-endian `i64`.
    ///
    /// # Errors
    /// [`MorselError::Format`] on truncation.
    pub fn take_i64(&mut self) -> Result<i64, MorselError> {
        Ok(i64::from_be_bytes(self.take_array::<8>()?))
    }

    /// Consume a big-endian `u32`.
    ///
    /// # Errors
    /// [`MorselError::Format`] on truncation.
    pub fn take_u32(&mut self) -> Result<u32, MorselError> {
        Ok(u32::from_be_bytes(self.take_array::<4>()?))
    }

    /// Consume a single byte.
    ///
    /// # Errors
    /// [`MorselError::Format`] on truncation.
    pub fn take_u8(&mut self) -> Result<u8, MorselError> {
        let [byte] = self.take_array::<1>()?;
        Ok(byte)
    }

    /// Consume a `u32`-length-prefixed UTF-8 string.
    ///
    /// # Errors
    /// [`MorselError::Format`] on truncation or malformed UTF-8.
    pub fn take_str(&mut self) -> Result<String, MorselError> {
        let len = usize::try_from(self.take_u32()?)
            .map_err(|_| self.bad("string length overflows memory"))?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| self.bad("string is not UTF-8"))
    }

    /// Assert the payload is fully consumed.
    ///
    /// # Errors
    /// [`MorselError::Format`] if bytes remain.
    pub fn finish(&self) -> Result<(), MorselError> {
        if self.data.is_empty() {
            Ok(())
        } else {
            Err(self.bad(format!("{} trailing bytes", self.data.len())))
        }
    }
}

/// Append a `u32`-length-prefixed UTF-8 string.
pub fn put_str(out: &mut Vec<u8>, value: &str) {
    let len = u32::try_from(value.len()).unwrap_or(u32::MAX);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(value.as_bytes());
}

/// Append a section: `tag || length || payload`.
pub fn put_section(out: &mut Vec<u8>, tag: u8, payload: &[u8]) {
    out.push(tag);
    let len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(payload);
}

#[cfg(test)]
mod tests {
    #![allow(clippy::indexing_slicing, reason = "fixture buffers are fixed-size")]

    use super::*;

    #[test]
    fn reads_mirror_writes() {
        let mut out = Vec::new();
        out.extend_from_slice(&7_u64.to_be_bytes());
        out.extend_from_slice(&(-9_i64).to_be_bytes());
        put_str(&mut out, "héllo");
        let mut reader = SectionReader::new("test", &out);
        assert_eq!(reader.take_u64().expect("u64"), 7);
        assert_eq!(reader.take_i64().expect("i64"), -9);
        assert_eq!(reader.take_str().expect("str"), "héllo");
        reader.finish().expect("consumed");
    }

    #[test]
    fn truncation_names_the_section() {
        let mut reader = SectionReader::new("rows", &[0_u8; 3]);
        let err = reader.take_u64().expect_err("short");
        assert!(matches!(err, MorselError::Format { section: "rows", .. }));
    }

    #[test]
    fn trailing_bytes_fail_finish() {
        let reader = SectionReader::new("meta", &[1, 2]);
        assert!(matches!(
            reader.finish(),
            Err(MorselError::Format { section: "meta", .. })
        ));
    }

    #[test]
    fn non_utf8_strings_are_rejected() {
        let mut out = Vec::new();
        out.extend_from_slice(&2_u32.to_be_bytes());
        out.extend_from_slice(&[0xFF, 0xFE]);
        let mut reader = SectionReader::new("meta", &out);
        assert!(reader.take_str().is_err());
    }
}
