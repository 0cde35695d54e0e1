//! Gate frame layout.
//!
//! ```text
//! [Length(2)] [HeaderTag(4)] [Command(2)] [Payload(N)]
//! ```
//!
//! All fields are big-endian. `Length` counts the whole frame, itself included,
//! so `Length == 8 + N` for every well-formed frame. There is no resynchronisation
//! on the wire: one bad length corrupts every frame after it.

use bytes::{BufMut, Bytes, BytesMut};

use crate::config::{FRAME_HEADER_LEN, HEADER_TAG, MAX_FRAME_SIZE};
use crate::error::{BridgeError, Result};

/// Bytes of `HeaderTag` + `Command` at the start of a frame remainder.
pub const REMAINDER_HEADER_LEN: usize = 6;

/// Size of the length prefix.
pub const LENGTH_PREFIX_LEN: usize = 2;

/// Parse the self-inclusive length prefix.
#[inline]
pub fn decode_length(prefix: [u8; 2]) -> u16 {
    u16::from_be_bytes(prefix)
}

/// Accumulates the payload of one outbound frame.
///
/// Every write is checked against [`MAX_FRAME_SIZE`]. A rejected write leaves
/// the builder exactly as it was, but the caller must then treat the frame as
/// incomplete and not send it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    command: u16,
    size: u16,
    payload: BytesMut,
}

impl OutboundFrame {
    pub fn new(command: u16) -> Self {
        Self {
            command,
            size: FRAME_HEADER_LEN as u16,
            payload: BytesMut::with_capacity(64),
        }
    }

    pub fn command(&self) -> u16 {
        self.command
    }

    /// Current value of the length prefix.
    pub fn size(&self) -> u16 {
        self.size
    }

    /// Payload written so far, without the header.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn reserve(&self, additional: usize) -> Result<()> {
        let attempted = self.size as usize + additional;
        if attempted > MAX_FRAME_SIZE {
            return Err(BridgeError::FrameOverflow {
                attempted,
                limit: MAX_FRAME_SIZE,
            });
        }
        Ok(())
    }

    /// Append a big-endian `u16`.
    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.reserve(2)?;
        self.payload.put_u16(value);
        self.size += 2;
        Ok(())
    }

    /// Append a string as `len+1 (u16)`, the bytes, then a zero terminator.
    pub fn write_str(&mut self, value: &str) -> Result<()> {
        if value.as_bytes().contains(&0) {
            return Err(BridgeError::InvalidString);
        }
        // The whole string must fit, not just its length prefix.
        let encoded = value.len() + 1;
        self.reserve(2 + encoded)?;

        self.payload.reserve(2 + encoded);
        self.payload.put_u16(encoded as u16);
        self.payload.put_slice(value.as_bytes());
        self.payload.put_u8(0);
        self.size += (2 + encoded) as u16;
        Ok(())
    }

    /// Prepend size, header tag and command, producing the wire bytes.
    pub fn build(self) -> WireFrame {
        let mut buf = BytesMut::with_capacity(self.size as usize);
        buf.put_u16(self.size);
        buf.put_u32(HEADER_TAG);
        buf.put_u16(self.command);
        buf.extend_from_slice(&self.payload);
        WireFrame {
            command: self.command,
            bytes: buf.freeze(),
        }
    }
}

/// A finished frame, ready to be written to the socket as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireFrame {
    command: u16,
    bytes: Bytes,
}

impl WireFrame {
    pub fn command(&self) -> u16 {
        self.command
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

/// Read cursor over a received frame remainder (everything after the length prefix).
///
/// Reads past the end never fail. They return zero or an empty string, which
/// callers must interpret as "absent" rather than a real zero.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    header: u32,
    command: u16,
    data: Bytes,
    offset: usize,
}

impl InboundFrame {
    /// Parse header tag and command eagerly, leaving the cursor at offset 6.
    pub fn parse(remainder: Bytes) -> Result<Self> {
        if remainder.len() < REMAINDER_HEADER_LEN {
            return Err(BridgeError::FrameTooShort(remainder.len()));
        }
        let header = u32::from_be_bytes([remainder[0], remainder[1], remainder[2], remainder[3]]);
        let command = u16::from_be_bytes([remainder[4], remainder[5]]);
        Ok(Self {
            header,
            command,
            data: remainder,
            offset: REMAINDER_HEADER_LEN,
        })
    }

    pub fn header(&self) -> u32 {
        self.header
    }

    pub fn command(&self) -> u16 {
        self.command
    }

    /// Bytes left after the cursor.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    pub fn read_u16(&mut self) -> u16 {
        if self.remaining() < 2 {
            return 0;
        }
        let value = u16::from_be_bytes([self.data[self.offset], self.data[self.offset + 1]]);
        self.offset += 2;
        value
    }

    pub fn read_u32(&mut self) -> u32 {
        if self.remaining() < 4 {
            return 0;
        }
        let o = self.offset;
        let value = u32::from_be_bytes([
            self.data[o],
            self.data[o + 1],
            self.data[o + 2],
            self.data[o + 3],
        ]);
        self.offset += 4;
        value
    }

    /// Read a length-prefixed, zero-terminated string.
    ///
    /// The terminator is stripped. A zero length, or a length that runs past the
    /// buffer, yields an empty string; in the overrun case the cursor stays after
    /// the length prefix.
    pub fn read_str(&mut self) -> String {
        let len = self.read_u16() as usize;
        if len == 0 || self.remaining() < len {
            return String::new();
        }
        let raw = &self.data[self.offset..self.offset + len];
        self.offset += len;
        let raw = raw.strip_suffix(&[0u8]).unwrap_or(raw);
        String::from_utf8_lossy(raw).into_owned()
    }
}
