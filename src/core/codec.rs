//! Tokio codec for the gate frame stream.
//!
//! Decoding yields the frame remainder (header tag, command, payload) of every
//! frame whose length prefix is greater than 2. Frames that carry nothing but a
//! length prefix are consumed and reported as [`GateItem::Empty`] so the reader
//! can count them without tearing the stream down.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::packet::{decode_length, WireFrame, LENGTH_PREFIX_LEN};
use crate::error::BridgeError;

/// One decoded unit from the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateItem {
    /// Bytes following the length prefix
    Frame(Bytes),
    /// A frame whose length prefix was 0, 1 or 2
    Empty(u16),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GateCodec;

impl Decoder for GateCodec {
    type Item = GateItem;
    type Error = BridgeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_PREFIX_LEN {
            return Ok(None);
        }

        let length = decode_length([src[0], src[1]]);
        if (length as usize) <= LENGTH_PREFIX_LEN {
            src.advance(LENGTH_PREFIX_LEN);
            return Ok(Some(GateItem::Empty(length)));
        }

        let total = length as usize;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_LEN);
        let remainder = src.split_to(total - LENGTH_PREFIX_LEN).freeze();
        Ok(Some(GateItem::Frame(remainder)))
    }
}

impl Encoder<WireFrame> for GateCodec {
    type Error = BridgeError;

    fn encode(&mut self, frame: WireFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(frame.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::core::packet::OutboundFrame;

    #[test]
    fn test_partial_frame_waits() {
        let mut codec = GateCodec;
        let mut buf = BytesMut::from(&[0x00, 0x0A, 0x80, 0x00][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn test_two_frames_in_one_buffer() {
        let mut codec = GateCodec;
        let mut buf = BytesMut::new();
        codec.encode(OutboundFrame::new(1).build(), &mut buf).unwrap();
        codec.encode(OutboundFrame::new(2).build(), &mut buf).unwrap();

        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(
            first,
            GateItem::Frame(Bytes::from_static(&[0x80, 0, 0, 0, 0, 1]))
        );
        assert_eq!(
            second,
            GateItem::Frame(Bytes::from_static(&[0x80, 0, 0, 0, 0, 2]))
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_empty_length_is_skipped() {
        let mut codec = GateCodec;
        let mut buf = BytesMut::from(&[0x00, 0x02, 0x00, 0x08][..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(GateItem::Empty(2)));
        assert_eq!(buf.len(), 2);
    }
}
