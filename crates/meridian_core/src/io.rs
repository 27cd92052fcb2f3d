//! # Binary Streams
//!
//! Little-endian reader/writer used by the base and diff world formats.
//!
//! ## Format primitives
//!
//! - Integers and floats: little-endian, fixed width
//! - Identifiers: `u16` byte length + UTF-8 bytes
//! - Blobs: `u32` byte length + raw bytes
//! - Sections: `u32` byte length patched in after the content is written
//!
//! Reads never panic. Running off the end of the stream yields
//! [`CoreError::UnexpectedEof`].

use crate::error::{CoreError, CoreResult};
use meridian_shared::StrId;
use std::sync::Arc;

/// Shared, immutable bytes of a loaded base stream.
///
/// Storages keep a clone so base components can be decoded on first access.
pub type BaseStream = Arc<[u8]>;

/// Growable little-endian writer.
#[derive(Debug, Default, Clone)]
pub struct BinaryWriter {
    buffer: Vec<u8>,
}

impl BinaryWriter {
    /// Creates an empty writer.
    #[must_use]
    pub const fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Creates a writer with reserved capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Returns the number of bytes written.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if no bytes have been written.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Returns the written bytes.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the writer and returns its bytes.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }

    /// Drops everything written so far, keeping the allocation.
    #[inline]
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Drops everything written after `len`.
    #[inline]
    pub fn truncate(&mut self, len: usize) {
        self.buffer.truncate(len);
    }

    /// Writes a single byte.
    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Writes a u16 in little-endian format.
    #[inline]
    pub fn write_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a u32 in little-endian format.
    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a u64 in little-endian format.
    #[inline]
    pub fn write_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a f32 in little-endian format.
    #[inline]
    pub fn write_f32(&mut self, value: f32) {
        self.write_u32(value.to_bits());
    }

    /// Writes raw bytes with no length prefix.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Writes an identifier as `u16` length + UTF-8.
    ///
    /// # Errors
    ///
    /// Fails if the identifier is longer than `u16::MAX` bytes.
    pub fn write_str_id(&mut self, id: StrId) -> CoreResult<()> {
        let bytes = id.as_str().as_bytes();
        let len = u16::try_from(bytes.len()).map_err(|_| CoreError::IdTooLong(bytes.len()))?;
        self.write_u16(len);
        self.write_bytes(bytes);
        Ok(())
    }

    /// Writes a `u32` length followed by `bytes`.
    ///
    /// # Errors
    ///
    /// Fails if `bytes` is longer than `u32::MAX`.
    pub fn write_blob(&mut self, bytes: &[u8]) -> CoreResult<()> {
        let len = u32::try_from(bytes.len()).map_err(|_| CoreError::SectionTooLarge(bytes.len()))?;
        self.write_u32(len);
        self.write_bytes(bytes);
        Ok(())
    }

    /// Starts a length-prefixed section and returns its start marker.
    ///
    /// Pair with [`BinaryWriter::end_section`].
    #[must_use]
    pub fn begin_section(&mut self) -> usize {
        let at = self.buffer.len();
        self.write_u32(0);
        at
    }

    /// Patches the length of the section started at `marker`.
    ///
    /// # Errors
    ///
    /// Fails if the section grew past `u32::MAX` bytes.
    pub fn end_section(&mut self, marker: usize) -> CoreResult<()> {
        let body = self.buffer.len() - marker - 4;
        let len = u32::try_from(body).map_err(|_| CoreError::SectionTooLarge(body))?;
        self.buffer[marker..marker + 4].copy_from_slice(&len.to_le_bytes());
        Ok(())
    }
}

/// Little-endian reader over a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> BinaryReader<'a> {
    /// Creates a reader at the start of `buffer`.
    #[must_use]
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Current offset from the start of the buffer.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Returns the number of bytes remaining.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// True if every byte has been consumed.
    #[inline]
    #[must_use]
    pub const fn is_at_end(&self) -> bool {
        self.remaining() == 0
    }

    /// Reads `len` raw bytes.
    ///
    /// # Errors
    ///
    /// Fails if fewer than `len` bytes remain.
    #[inline]
    pub fn read_bytes(&mut self, len: usize) -> CoreResult<&'a [u8]> {
        if len > self.remaining() {
            return Err(CoreError::UnexpectedEof {
                needed: len,
                offset: self.position,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buffer[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    /// Skips `len` bytes.
    ///
    /// # Errors
    ///
    /// Fails if fewer than `len` bytes remain.
    #[inline]
    pub fn skip(&mut self, len: usize) -> CoreResult<()> {
        self.read_bytes(len).map(|_| ())
    }

    fn read_array<const N: usize>(&mut self) -> CoreResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Reads a single byte.
    ///
    /// # Errors
    ///
    /// Fails at end of stream.
    #[inline]
    pub fn read_u8(&mut self) -> CoreResult<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Reads a u16 in little-endian format.
    ///
    /// # Errors
    ///
    /// Fails at end of stream.
    #[inline]
    pub fn read_u16(&mut self) -> CoreResult<u16> {
        self.read_array().map(u16::from_le_bytes)
    }

    /// Reads a u32 in little-endian format.
    ///
    /// # Errors
    ///
    /// Fails at end of stream.
    #[inline]
    pub fn read_u32(&mut self) -> CoreResult<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    /// Reads a u64 in little-endian format.
    ///
    /// # Errors
    ///
    /// Fails at end of stream.
    #[inline]
    pub fn read_u64(&mut self) -> CoreResult<u64> {
        self.read_array().map(u64::from_le_bytes)
    }

    /// Reads a f32 in little-endian format.
    ///
    /// # Errors
    ///
    /// Fails at end of stream.
    #[inline]
    pub fn read_f32(&mut self) -> CoreResult<f32> {
        self.read_u32().map(f32::from_bits)
    }

    /// Reads a `u16`-prefixed identifier and interns it.
    ///
    /// # Errors
    ///
    /// Fails at end of stream or on invalid UTF-8.
    pub fn read_str_id(&mut self) -> CoreResult<StrId> {
        let len = usize::from(self.read_u16()?);
        let at = self.position;
        let bytes = self.read_bytes(len)?;
        let s = std::str::from_utf8(bytes).map_err(|_| CoreError::InvalidUtf8(at))?;
        Ok(StrId::new(s))
    }

    /// Reads a `u32`-prefixed blob.
    ///
    /// # Errors
    ///
    /// Fails if the prefix or the body is truncated.
    pub fn read_blob(&mut self) -> CoreResult<&'a [u8]> {
        let len = self.read_u32()? as usize;
        self.read_bytes(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives_are_little_endian() {
        let mut w = BinaryWriter::new();
        w.write_u16(0x0102);
        w.write_u32(0x0304_0506);
        assert_eq!(w.as_slice(), &[0x02, 0x01, 0x06, 0x05, 0x04, 0x03]);
    }

    #[test]
    fn test_read_back_mixed() {
        let mut w = BinaryWriter::new();
        w.write_u8(7);
        w.write_u64(u64::MAX - 1);
        w.write_f32(1.5);
        w.write_str_id(StrId::new("Position")).unwrap();
        w.write_blob(&[1, 2, 3]).unwrap();

        let mut r = BinaryReader::new(w.as_slice());
        assert_eq!(r.read_u8().unwrap(), 7);
        assert_eq!(r.read_u64().unwrap(), u64::MAX - 1);
        assert!((r.read_f32().unwrap() - 1.5).abs() < f32::EPSILON);
        assert_eq!(r.read_str_id().unwrap(), StrId::new("Position"));
        assert_eq!(r.read_blob().unwrap(), &[1, 2, 3]);
        assert!(r.is_at_end());
    }

    #[test]
    fn test_truncated_read_fails() {
        let mut r = BinaryReader::new(&[1, 2, 3]);
        let err = r.read_u32().unwrap_err();
        assert!(matches!(
            err,
            CoreError::UnexpectedEof {
                needed: 4,
                offset: 0,
                remaining: 3
            }
        ));
        // A failed read consumes nothing
        assert_eq!(r.position(), 0);
    }

    #[test]
    fn test_empty_str_id() {
        let mut w = BinaryWriter::new();
        w.write_str_id(StrId::EMPTY).unwrap();
        assert_eq!(w.as_slice(), &[0, 0]);
        assert!(BinaryReader::new(w.as_slice()).read_str_id().unwrap().is_empty());
    }

    #[test]
    fn test_section_length_patched() {
        let mut w = BinaryWriter::new();
        let marker = w.begin_section();
        w.write_u32(9);
        w.write_u8(1);
        w.end_section(marker).unwrap();

        let mut r = BinaryReader::new(w.as_slice());
        let body = r.read_blob().unwrap();
        assert_eq!(body.len(), 5);
        assert!(r.is_at_end());
    }
}
