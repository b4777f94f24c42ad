//! Primitive reader and writer.
//!
//! These move exactly one primitive value at a time between the caller and an
//! underlying [`BytesMut`] sink or [`Bytes`] source. All multi-byte values are
//! little-endian. Variable-size runs (strings and raw bytes) carry a
//! compressed length prefix, see [`crate::compact`].

use bytes::{Buf, BufMut, Bytes, BytesMut};
use rust_decimal::Decimal;

use crate::compact::{self, CompressType};
use crate::{EncoderError, Result};

/// Sequential writer of primitive values.
#[derive(Debug, Default)]
pub struct Writer {
    buf: BytesMut,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consumes the writer and returns the written bytes.
    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }

    /// View of the bytes written so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.put_u8(u8::from(value));
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.buf.put_i8(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.put_u16_le(value);
    }

    pub fn write_i16(&mut self, value: i16) {
        self.buf.put_i16_le(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.put_u32_le(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.put_i32_le(value);
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.put_u64_le(value);
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buf.put_i64_le(value);
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.put_f32_le(value);
    }

    pub fn write_f64(&mut self, value: f64) {
        self.buf.put_f64_le(value);
    }

    /// Writes the 16-byte `rust_decimal` representation.
    pub fn write_decimal(&mut self, value: &Decimal) {
        self.buf.put_slice(&value.serialize());
    }

    /// Writes a `char` as its `u32` scalar value.
    pub fn write_char(&mut self, value: char) {
        self.buf.put_u32_le(u32::from(value));
    }

    /// Writes the compressed-integer width tag that precedes a compressed payload.
    pub fn write_compress_type(&mut self, tag: CompressType) {
        self.buf.put_u8(tag as u8);
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_str(&mut self, value: &str) {
        compact::write_length(self, value.len());
        self.buf.put_slice(value.as_bytes());
    }

    /// Writes a length-prefixed byte run in a single copy.
    pub fn write_bytes(&mut self, value: &[u8]) {
        compact::write_length(self, value.len());
        self.buf.put_slice(value);
    }

    /// Writes raw bytes with no prefix.
    pub fn write_raw(&mut self, value: &[u8]) {
        self.buf.put_slice(value);
    }
}

/// Sequential reader of primitive values.
#[derive(Debug, Clone)]
pub struct Reader {
    buf: Bytes,
}

impl Reader {
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Returns true once every byte of the source has been consumed.
    pub fn is_end(&self) -> bool {
        !self.buf.has_remaining()
    }

    #[inline]
    fn ensure(&self, needed: usize) -> Result<()> {
        if self.buf.remaining() < needed {
            return Err(EncoderError::InsufficientData);
        }
        Ok(())
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        self.ensure(1)?;
        match self.buf.get_u8() {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(EncoderError::Decode(format!(
                "Expected bool byte (0 or 1), got {}",
                other
            ))),
        }
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        self.ensure(1)?;
        Ok(self.buf.get_i8())
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.ensure(2)?;
        Ok(self.buf.get_u16_le())
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        self.ensure(2)?;
        Ok(self.buf.get_i16_le())
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.ensure(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.ensure(4)?;
        Ok(self.buf.get_i32_le())
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.ensure(8)?;
        Ok(self.buf.get_u64_le())
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.ensure(8)?;
        Ok(self.buf.get_i64_le())
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        self.ensure(4)?;
        Ok(self.buf.get_f32_le())
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        self.ensure(8)?;
        Ok(self.buf.get_f64_le())
    }

    pub fn read_decimal(&mut self) -> Result<Decimal> {
        self.ensure(16)?;
        let mut raw = [0u8; 16];
        self.buf.copy_to_slice(&mut raw);
        Ok(Decimal::deserialize(raw))
    }

    pub fn read_char(&mut self) -> Result<char> {
        let scalar = self.read_u32()?;
        char::from_u32(scalar).ok_or_else(|| {
            EncoderError::Decode(format!("Invalid char scalar value: 0x{:X}", scalar))
        })
    }

    /// Reads the pending compressed-integer width tag.
    pub fn read_compress_type(&mut self) -> Result<CompressType> {
        let tag = self.read_u8()?;
        CompressType::try_from(tag)
    }

    /// Returns the pending width tag without consuming it.
    pub fn peek_compress_type(&self) -> Result<CompressType> {
        self.ensure(1)?;
        CompressType::try_from(self.buf.chunk()[0])
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = compact::read_length(self)?;
        let raw = self.read_raw(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|e| EncoderError::Decode(format!("Invalid UTF-8 in string: {}", e)))
    }

    /// Reads a length-prefixed byte run without copying.
    pub fn read_bytes(&mut self) -> Result<Bytes> {
        let len = compact::read_length(self)?;
        self.read_raw(len)
    }

    /// Reads exactly `len` raw bytes without copying.
    pub fn read_raw(&mut self, len: usize) -> Result<Bytes> {
        self.ensure(len)?;
        Ok(self.buf.split_to(len))
    }
}

impl From<Bytes> for Reader {
    fn from(buf: Bytes) -> Self {
        Self::new(buf)
    }
}
