//! Fixed-width binary reader and writer.
//!
//! Every relay message is a one-byte code followed by fixed-order fields.
//! Integers and floats are little endian; strings are a `u16` byte length
//! followed by UTF-8; a trailing blob is simply "whatever is left".
//!
//! The reader owns a [`Bytes`] so trailing blobs come out as zero-copy
//! slices of the original datagram and can be relayed without copying.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::ProtocolError;

/// Longest string a `u16` length prefix can describe, in bytes.
pub const MAX_STRING_LEN: usize = u16::MAX as usize;

/// Reads primitive fields off the front of a message.
#[derive(Debug, Clone)]
pub struct PacketReader {
    buf: Bytes,
}

impl PacketReader {
    /// Wraps a message for reading.
    pub fn new(buf: impl Into<Bytes>) -> Self {
        Self { buf: buf.into() }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// True when every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn need(&self, needed: usize) -> Result<(), ProtocolError> {
        let available = self.buf.remaining();
        if available < needed {
            return Err(ProtocolError::Truncated { needed, available });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    /// Any non-zero byte is `true`.
    pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        self.need(2)?;
        Ok(self.buf.get_u16_le())
    }

    pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        self.need(4)?;
        Ok(self.buf.get_i32_le())
    }

    pub fn read_u64(&mut self) -> Result<u64, ProtocolError> {
        self.need(8)?;
        Ok(self.buf.get_u64_le())
    }

    pub fn read_f32(&mut self) -> Result<f32, ProtocolError> {
        self.need(4)?;
        Ok(self.buf.get_f32_le())
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, ProtocolError> {
        let len = usize::from(self.read_u16()?);
        self.need(len)?;
        let raw = self.buf.split_to(len);
        String::from_utf8(raw.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
    }

    /// Takes everything that is left.
    pub fn read_remaining(&mut self) -> Bytes {
        std::mem::take(&mut self.buf)
    }
}

/// Builds a message field by field.
#[derive(Debug, Default)]
pub struct PacketWriter {
    buf: BytesMut,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a message with its one-byte code.
    pub fn with_code(code: u8) -> Self {
        let mut writer = Self::new();
        writer.write_u8(code);
        writer
    }

    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    pub fn write_bool(&mut self, value: bool) -> &mut Self {
        self.write_u8(u8::from(value))
    }

    pub fn write_u16(&mut self, value: u16) -> &mut Self {
        self.buf.put_u16_le(value);
        self
    }

    pub fn write_i32(&mut self, value: i32) -> &mut Self {
        self.buf.put_i32_le(value);
        self
    }

    pub fn write_u64(&mut self, value: u64) -> &mut Self {
        self.buf.put_u64_le(value);
        self
    }

    pub fn write_f32(&mut self, value: f32) -> &mut Self {
        self.buf.put_f32_le(value);
        self
    }

    /// Writes a length-prefixed UTF-8 string.
    ///
    /// Strings longer than `u16::MAX` bytes are cut at the last character
    /// boundary that fits.
    pub fn write_string(&mut self, value: &str) -> &mut Self {
        let mut end = value.len().min(MAX_STRING_LEN);
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        let bytes = &value.as_bytes()[..end];
        // `end` is at most u16::MAX, so the cast is lossless.
        self.buf.put_u16_le(end as u16);
        self.buf.put_slice(bytes);
        self
    }

    /// Appends raw bytes with no length prefix.
    pub fn write_bytes(&mut self, value: &[u8]) -> &mut Self {
        self.buf.put_slice(value);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Freezes the message.
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}
