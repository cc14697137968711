//! Length-prefixed framing primitives.
//!
//! Two prefix styles are used on the wire:
//! - `i32` little-endian byte counts for request frames and archive fields
//! - 7-bit variable-length counts (LEB128) for response status strings

use crate::error::{ProtocolError, ProtocolResult};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Validates a raw `i32` length prefix against the bytes that may follow.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidLength`] if `raw` is negative or larger
/// than `limit`.
pub fn frame_len(raw: i32, limit: usize) -> ProtocolResult<usize> {
    let len = usize::try_from(raw).map_err(|_| ProtocolError::InvalidLength(i64::from(raw)))?;
    if len > limit {
        return Err(ProtocolError::InvalidLength(i64::from(raw)));
    }
    Ok(len)
}

/// Converts a byte count into an `i32` prefix.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidLength`] for payloads over `i32::MAX`.
pub fn prefix_for(len: usize) -> ProtocolResult<i32> {
    i32::try_from(len).map_err(|_| ProtocolError::InvalidLength(len as i64))
}

/// Appends an `i32` length prefix followed by `data`.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidLength`] for payloads over `i32::MAX`.
pub fn put_frame(buf: &mut BytesMut, data: &[u8]) -> ProtocolResult<()> {
    buf.put_i32_le(prefix_for(data.len())?);
    buf.put_slice(data);
    Ok(())
}

/// Appends a 7-bit length-prefixed UTF-8 string.
pub fn put_status(buf: &mut BytesMut, text: &str) {
    let mut len = text.len();
    while len >= 0x80 {
        buf.put_u8((len as u8 & 0x7F) | 0x80);
        len >>= 7;
    }
    buf.put_u8(len as u8);
    buf.put_slice(text.as_bytes());
}

/// Cursor over a received message.
///
/// Every read checks that enough bytes remain; nothing panics on short input.
#[derive(Debug, Clone)]
pub struct FrameReader {
    buf: Bytes,
}

impl FrameReader {
    /// Wraps a complete message.
    pub fn new(buf: impl Into<Bytes>) -> Self {
        Self { buf: buf.into() }
    }

    /// Returns the number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn ensure(&self, needed: usize) -> ProtocolResult<()> {
        if self.buf.remaining() < needed {
            return Err(ProtocolError::Truncated {
                needed,
                available: self.buf.remaining(),
            });
        }
        Ok(())
    }

    /// Reads a little-endian `i32`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Truncated`] if fewer than four bytes remain.
    pub fn read_i32(&mut self) -> ProtocolResult<i32> {
        self.ensure(4)?;
        Ok(self.buf.get_i32_le())
    }

    /// Reads an `i32` length prefix and the bytes it announces.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix is negative or overruns the input.
    pub fn read_frame(&mut self) -> ProtocolResult<Bytes> {
        let raw = self.read_i32()?;
        let len = frame_len(raw, usize::MAX)?;
        self.ensure(len)?;
        Ok(self.buf.split_to(len))
    }

    /// Reads an `i32`-prefixed UTF-8 string.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is malformed or not UTF-8.
    pub fn read_string(&mut self, field: &'static str) -> ProtocolResult<String> {
        let frame = self.read_frame()?;
        String::from_utf8(frame.to_vec()).map_err(|_| ProtocolError::InvalidUtf8(field))
    }

    /// Reads a 7-bit length-prefixed UTF-8 string.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix is overlong, the input is short, or the
    /// text is not UTF-8.
    pub fn read_status(&mut self) -> ProtocolResult<String> {
        let mut len = 0usize;
        let mut shift = 0u32;
        loop {
            self.ensure(1)?;
            let byte = self.buf.get_u8();
            len |= usize::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
            if shift > 28 {
                return Err(ProtocolError::InvalidLength(len as i64));
            }
        }

        self.ensure(len)?;
        let text = self.buf.split_to(len);
        String::from_utf8(text.to_vec()).map_err(|_| ProtocolError::InvalidUtf8("status"))
    }

    /// Consumes the reader and returns every unread byte.
    pub fn into_rest(self) -> Bytes {
        self.buf
    }

    /// Fails unless the whole input was consumed.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::TrailingBytes`] if bytes remain.
    pub fn finish(self) -> ProtocolResult<()> {
        match self.buf.remaining() {
            0 => Ok(()),
            n => Err(ProtocolError::TrailingBytes(n)),
        }
    }
}
