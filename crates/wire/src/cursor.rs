//! Bounds-checked reading and writing of TLV buffers.
//!
//! The reader side replaces the original daemon's pointer walks over
//! attacker-controlled packets: every access checks the remaining length
//! first and fails closed, so a hostile length field can at worst produce a
//! `Truncated` error, never an out-of-bounds read.

use thiserror::Error;

/// Errors raised by the wire codec.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("buffer truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("record length {len} invalid for {what}")]
    BadLength { what: &'static str, len: usize },

    #[error("unexpected record type {got:#04x} at position {index}, wanted {wanted}")]
    UnexpectedRecord {
        index: usize,
        got: u8,
        wanted: &'static str,
    },

    #[error("malformed {what}: {detail}")]
    BadRecord {
        what: &'static str,
        detail: &'static str,
    },

    #[error("trailing bytes after final record")]
    TrailingBytes,
}

/// Forward-only reader over an untrusted byte buffer.
#[derive(Debug, Clone)]
pub struct TlvCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> TlvCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        TlvCursor { buf, pos: 0 }
    }

    /// Current byte offset from the start of the buffer.
    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn check(&self, needed: usize) -> Result<(), WireError> {
        if needed > self.remaining() {
            Err(WireError::Truncated {
                needed,
                remaining: self.remaining(),
            })
        } else {
            Ok(())
        }
    }

    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        self.check(1)?;
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    pub fn read_u16(&mut self) -> Result<u16, WireError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Takes the next `n` bytes, advancing the cursor.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        self.check(n)?;
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    /// Everything not yet consumed, without advancing.
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}

/// Append-only builder for TLV-framed buffers.
///
/// Record lengths cover the header and the body, matching the on-wire
/// layout the cursor expects.
#[derive(Debug, Default)]
pub struct TlvWriter {
    buf: Vec<u8>,
}

impl TlvWriter {
    pub fn new() -> Self {
        TlvWriter { buf: Vec::new() }
    }

    /// Appends one record; returns the byte offset of its header.
    pub fn record(&mut self, frame_type: u8, body: &[u8]) -> usize {
        let at = self.buf.len();
        let len = (crate::records::TLV_HDR_LEN + body.len()) as u16;
        self.buf.push(frame_type);
        self.buf.extend_from_slice(&len.to_be_bytes());
        self.buf.extend_from_slice(body);
        at
    }

    /// Appends pre-framed record bytes verbatim.
    pub fn raw(&mut self, framed: &[u8]) {
        self.buf.extend_from_slice(framed);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Mutable view over the written bytes, for patching reserved fields
    /// after the surrounding data has been framed.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}
