//! Message envelope framing.
//!
//! Every frame on the wire:
//!
//! ```text
//! +----------+-----------+----------+-------------------+
//! |  Magic   |  Command  |  Length  |      Payload      |
//! | 4 bytes  | 12 bytes  | 4 bytes  |  (Length bytes)   |
//! +----------+-----------+----------+-------------------+
//! ```
//!
//! - Magic: the network constant, little-endian
//! - Command: ASCII message tag, zero-padded
//! - Length: payload length in bytes, little-endian
//!
//! Signed message kinds carry their `(signature, public key)` pair inside
//! the payload; the envelope itself is not authenticated.

use crate::{Message, WireError, WireResult, MAX_BLOCK_SIZE};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Command tag width.
const COMMAND_SIZE: usize = 12;

/// Header size: magic (4) + command (12) + length (4).
const HEADER_SIZE: usize = 4 + COMMAND_SIZE + 4;

/// Envelope codec parameterized by the network magic.
pub struct EnvelopeCodec {
    /// Network magic.
    magic: u32,
    /// Maximum allowed payload size.
    max_size: usize,
}

impl EnvelopeCodec {
    /// Create a codec for the given network magic.
    pub fn new(magic: u32) -> Self {
        Self {
            magic,
            max_size: MAX_BLOCK_SIZE,
        }
    }

    fn command_tag(command: &str) -> WireResult<[u8; COMMAND_SIZE]> {
        let bytes = command.as_bytes();
        if bytes.len() > COMMAND_SIZE {
            return Err(WireError::Decode(format!("command too long: {}", command)));
        }
        let mut tag = [0u8; COMMAND_SIZE];
        tag[..bytes.len()].copy_from_slice(bytes);
        Ok(tag)
    }

    fn command_str(tag: &[u8]) -> WireResult<&str> {
        let end = tag.iter().position(|&b| b == 0).unwrap_or(tag.len());
        if tag[end..].iter().any(|&b| b != 0) {
            return Err(WireError::Decode("non-zero command padding".to_string()));
        }
        std::str::from_utf8(&tag[..end])
            .map_err(|_| WireError::Decode("command tag is not ASCII".to_string()))
    }
}

impl Decoder for EnvelopeCodec {
    type Item = Message;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        // Parse the header without consuming
        let magic = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
        if magic != self.magic {
            return Err(WireError::BadMagic {
                expected: self.magic,
                got: magic,
            });
        }

        let length = u32::from_le_bytes([src[16], src[17], src[18], src[19]]) as usize;
        if length > self.max_size {
            return Err(WireError::OversizedFrame {
                size: length,
                max: self.max_size,
            });
        }

        let total_size = HEADER_SIZE + length;
        if src.len() < total_size {
            src.reserve(total_size - src.len());
            return Ok(None);
        }

        // Consume the whole frame before parsing, so a payload-level
        // failure leaves the buffer positioned at the next frame
        let mut tag = [0u8; COMMAND_SIZE];
        tag.copy_from_slice(&src[4..4 + COMMAND_SIZE]);
        src.advance(HEADER_SIZE);
        let payload = src.split_to(length).freeze();

        let command = Self::command_str(&tag)?;
        Message::decode_payload(command, payload).map(Some)
    }
}

impl Encoder<Message> for EnvelopeCodec {
    type Error = WireError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let tag = Self::command_tag(item.command())?;
        let payload = item.encode_payload()?;

        if payload.len() > self.max_size {
            return Err(WireError::OversizedFrame {
                size: payload.len(),
                max: self.max_size,
            });
        }

        dst.reserve(HEADER_SIZE + payload.len());
        dst.put_u32_le(self.magic);
        dst.put_slice(&tag);
        dst.put_u32_le(payload.len() as u32);
        dst.put_slice(&payload);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AddrPayload, Capability, PeerInfo};

    const TEST_MAGIC: u32 = 0x1288_2304;

    #[test]
    fn test_codec_roundtrip() {
        let mut codec = EnvelopeCodec::new(TEST_MAGIC);
        let message = Message::Addr(AddrPayload {
            peers: vec![PeerInfo::new(vec![127, 0, 0, 1], 8223, Capability::node())],
        });

        let mut buf = BytesMut::new();
        codec.encode(message.clone(), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(message, decoded);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_frame_waits() {
        let mut codec = EnvelopeCodec::new(TEST_MAGIC);
        let mut buf = BytesMut::new();
        codec.encode(Message::Ping, &mut buf).unwrap();

        // Only part of the header has arrived
        let mut short_header = buf.split_to(10);
        assert!(codec.decode(&mut short_header).unwrap().is_none());
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut codec = EnvelopeCodec::new(TEST_MAGIC);
        let mut buf = BytesMut::new();
        codec.encode(Message::Ping, &mut buf).unwrap();

        let mut wrong = EnvelopeCodec::new(0xdead_beef);
        let err = wrong.decode(&mut buf).unwrap_err();
        assert!(matches!(err, WireError::BadMagic { .. }));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut codec = EnvelopeCodec::new(TEST_MAGIC);
        let mut buf = BytesMut::new();
        buf.put_u32_le(TEST_MAGIC);
        buf.put_slice(&EnvelopeCodec::command_tag("tx").unwrap());
        buf.put_u32_le((MAX_BLOCK_SIZE + 1) as u32);

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, WireError::OversizedFrame { .. }));
    }

    #[test]
    fn test_unknown_command_rejected() {
        let mut codec = EnvelopeCodec::new(TEST_MAGIC);
        let mut buf = BytesMut::new();
        buf.put_u32_le(TEST_MAGIC);
        buf.put_slice(&EnvelopeCodec::command_tag("bogus").unwrap());
        buf.put_u32_le(0);

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, WireError::UnknownMessageType(_)));
    }

    #[test]
    fn test_two_frames_in_one_buffer() {
        let mut codec = EnvelopeCodec::new(TEST_MAGIC);
        let mut buf = BytesMut::new();
        codec.encode(Message::Ping, &mut buf).unwrap();
        codec.encode(Message::Pong, &mut buf).unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), Message::Ping);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), Message::Pong);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }
}
