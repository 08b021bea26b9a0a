//! SSH binary packet framing (RFC 4253 Section 6), cleartext only.
//!
//! # Packet Format
//!
//! ```text
//! uint32    total_length      (counts everything after itself)
//! byte      padding_length
//! byte      message type
//! byte[n1]  payload           (n1 = total_length - padding_length - 2)
//! byte[n2]  padding           (n2 = padding_length, always zero)
//! ```
//!
//! No MAC is ever appended: keys are never installed, so every packet on the
//! wire stays in this shape for the whole connection.
//!
//! # Constraints
//!
//! - Decoding fails iff `padding_length >= total_length - 1`, i.e. when the
//!   padding would leave no room for the message type byte. There is no
//!   partial decode.
//! - Encoding uses a fixed padding of [`PADDING_LEN`] zero bytes. Block
//!   alignment is irrelevant because no cipher ever runs.
//!
//! # Example
//!
//! ```rust
//! use mirage_proto::ssh::{MessageType, Packet};
//!
//! let packet = Packet::new(MessageType::ServiceRequest, b"payload".to_vec());
//! let wire = packet.to_bytes();
//!
//! let parsed = Packet::from_bytes(&wire).unwrap();
//! assert_eq!(parsed.message_type(), 5);
//! assert_eq!(parsed.payload(), b"payload");
//! ```

use crate::ssh::message::MessageType;
use bytes::{Buf, BufMut, BytesMut};
use mirage_platform::{MirageError, MirageResult};

/// Length of the fixed frame header: 4-byte length + 1-byte padding length.
pub const HEADER_LEN: usize = 5;

/// Padding appended to every outbound packet.
pub const PADDING_LEN: u8 = 4;

/// Default ceiling for an inbound `total_length` (RFC 4253 Section 6.1).
pub const MAX_PACKET_SIZE: usize = 35000;

/// The 5-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    total_length: u32,
    padding_length: u8,
}

impl PacketHeader {
    /// Parses the fixed 5-byte header.
    pub fn parse(header: [u8; HEADER_LEN]) -> Self {
        let mut buf = &header[..];
        let total_length = buf.get_u32();
        let padding_length = buf.get_u8();
        Self {
            total_length,
            padding_length,
        }
    }

    /// Declared `total_length`.
    pub fn total_length(&self) -> u32 {
        self.total_length
    }

    /// Declared padding length.
    pub fn padding_length(&self) -> u8 {
        self.padding_length
    }

    /// Number of bytes following the header (`total_length - 1`).
    ///
    /// Zero when `total_length` is zero; [`Packet::decode`] rejects that frame.
    pub fn body_length(&self) -> usize {
        (self.total_length as usize).saturating_sub(1)
    }
}

/// A decoded SSH packet: message type plus payload.
///
/// Padding content is not retained; only its length is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    message_type: u8,
    payload: Vec<u8>,
    padding_length: u8,
}

impl Packet {
    /// Creates an outbound packet with the fixed padding.
    pub fn new(message_type: MessageType, payload: Vec<u8>) -> Self {
        Self::with_raw_type(message_type as u8, payload)
    }

    /// Creates an outbound packet for an arbitrary message number.
    pub fn with_raw_type(message_type: u8, payload: Vec<u8>) -> Self {
        Self {
            message_type,
            payload,
            padding_length: PADDING_LEN,
        }
    }

    /// Returns the raw message type byte.
    pub fn message_type(&self) -> u8 {
        self.message_type
    }

    /// Returns the message type if it is one the mock knows.
    pub fn kind(&self) -> Option<MessageType> {
        MessageType::from_u8(self.message_type)
    }

    /// Returns the payload (everything after the type byte, before padding).
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consumes the packet, returning its payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Returns the padding length.
    pub fn padding_length(&self) -> u8 {
        self.padding_length
    }

    /// `total_length` as it appears on the wire: `2 + payload + padding`.
    pub fn total_length(&self) -> usize {
        2 + self.payload.len() + self.padding_length as usize
    }

    /// Serializes this packet to wire format.
    ///
    /// ```text
    /// uint32    total_length (big-endian)
    /// byte      padding_length
    /// byte      message type
    /// byte[n1]  payload
    /// byte[n2]  zero padding
    /// ```
    pub fn to_bytes(&self) -> Vec<u8> {
        let total_length = self.total_length();
        let mut buf = BytesMut::with_capacity(4 + total_length);

        buf.put_u32(total_length as u32);
        buf.put_u8(self.padding_length);
        buf.put_u8(self.message_type);
        buf.put_slice(&self.payload);
        buf.put_bytes(0, self.padding_length as usize);

        buf.to_vec()
    }

    /// Decodes a packet from its header and the `total_length - 1` body bytes.
    ///
    /// # Errors
    ///
    /// Returns [`MirageError::FrameDecode`] if `padding_length >= body.len()`,
    /// which would leave a negative-length payload.
    pub fn decode(header: &PacketHeader, body: &[u8]) -> MirageResult<Self> {
        let padding_length = header.padding_length();
        if padding_length as usize >= body.len() {
            return Err(MirageError::FrameDecode {
                padding_length,
                body_length: body.len(),
            });
        }

        let message_type = body[0];
        let payload = body[1..body.len() - padding_length as usize].to_vec();

        Ok(Self {
            message_type,
            payload,
            padding_length,
        })
    }

    /// Parses one complete frame (header + body) from a byte slice.
    ///
    /// # Errors
    ///
    /// Returns [`MirageError::Protocol`] if the slice is shorter or longer
    /// than the frame it declares, and [`MirageError::FrameDecode`] for an
    /// inconsistent padding length.
    pub fn from_bytes(data: &[u8]) -> MirageResult<Self> {
        if data.len() < HEADER_LEN {
            return Err(MirageError::Protocol(format!(
                "Packet too short: {} bytes (minimum {})",
                data.len(),
                HEADER_LEN
            )));
        }

        let mut raw = [0u8; HEADER_LEN];
        raw.copy_from_slice(&data[..HEADER_LEN]);
        let header = PacketHeader::parse(raw);

        let body = &data[HEADER_LEN..];
        let expected = header.body_length();
        if body.len() < expected {
            return Err(MirageError::Protocol(format!(
                "Incomplete packet: expected {} body bytes, got {}",
                expected,
                body.len()
            )));
        }
        if body.len() > expected {
            return Err(MirageError::Protocol(format!(
                "Trailing data: {} bytes after packet",
                body.len() - expected
            )));
        }

        Self::decode(&header, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(total_length: u32, padding_length: u8) -> PacketHeader {
        let mut raw = [0u8; HEADER_LEN];
        raw[..4].copy_from_slice(&total_length.to_be_bytes());
        raw[4] = padding_length;
        PacketHeader::parse(raw)
    }

    #[test]
    fn test_encode_layout() {
        let packet = Packet::new(MessageType::ServiceAccept, b"abc".to_vec());
        let bytes = packet.to_bytes();

        // total_length = 2 + 3 + 4
        assert_eq!(&bytes[..4], &9u32.to_be_bytes());
        assert_eq!(bytes[4], PADDING_LEN);
        assert_eq!(bytes[5], 6);
        assert_eq!(&bytes[6..9], b"abc");
        assert_eq!(&bytes[9..], &[0, 0, 0, 0]);
        assert_eq!(bytes.len(), 4 + packet.total_length());
    }

    #[test]
    fn test_empty_payload() {
        let packet = Packet::new(MessageType::NewKeys, Vec::new());
        let bytes = packet.to_bytes();
        assert_eq!(bytes, vec![0, 0, 0, 6, 4, 21, 0, 0, 0, 0]);

        let parsed = Packet::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.kind(), Some(MessageType::NewKeys));
        assert!(parsed.payload().is_empty());
    }

    #[test]
    fn test_round_trip_various_types() {
        for (msg_type, payload) in [
            (1u8, Vec::new()),
            (20, vec![0u8; 116]),
            (94, b"\x00\x00\x00\x07\x00\x00\x00\x02hi".to_vec()),
            (250, vec![0xff; 300]),
        ] {
            let packet = Packet::with_raw_type(msg_type, payload.clone());
            let parsed = Packet::from_bytes(&packet.to_bytes()).unwrap();
            assert_eq!(parsed.message_type(), msg_type);
            assert_eq!(parsed.payload(), &payload[..]);
        }
    }

    #[test]
    fn test_decode_foreign_padding() {
        // Peer chose 6 bytes of non-zero padding.
        let body = [50, b'x', b'y', 9, 9, 9, 9, 9, 9];
        let packet = Packet::decode(&header(10, 6), &body).unwrap();
        assert_eq!(packet.message_type(), 50);
        assert_eq!(packet.payload(), b"xy");
        assert_eq!(packet.padding_length(), 6);
    }

    #[test]
    fn test_decode_padding_consumes_payload_exactly() {
        // padding_length == body.len() - 1: empty payload, still valid
        let body = [21, 0, 0, 0, 0];
        let packet = Packet::decode(&header(6, 4), &body).unwrap();
        assert_eq!(packet.message_type(), 21);
        assert!(packet.payload().is_empty());
    }

    #[test]
    fn test_decode_padding_too_long() {
        let body = [21, 0, 0, 0];
        let result = Packet::decode(&header(5, 4), &body);
        match result {
            Err(MirageError::FrameDecode {
                padding_length,
                body_length,
            }) => {
                assert_eq!(padding_length, 4);
                assert_eq!(body_length, 4);
            }
            other => panic!("Expected FrameDecode, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_fails_iff_padding_reaches_total_minus_one() {
        for total_length in 1u32..12 {
            for padding_length in 0u8..14 {
                let h = header(total_length, padding_length);
                let body = vec![7u8; h.body_length()];
                let result = Packet::decode(&h, &body);
                let should_fail = padding_length as u32 >= total_length - 1;
                assert_eq!(
                    result.is_err(),
                    should_fail,
                    "total_length={} padding_length={}",
                    total_length,
                    padding_length
                );
            }
        }
    }

    #[test]
    fn test_zero_total_length_rejected() {
        let h = header(0, 0);
        assert_eq!(h.body_length(), 0);
        assert!(matches!(
            Packet::decode(&h, &[]),
            Err(MirageError::FrameDecode { .. })
        ));
    }

    #[test]
    fn test_from_bytes_too_short() {
        let result = Packet::from_bytes(&[0, 0, 0, 10]);
        assert!(matches!(result, Err(MirageError::Protocol(_))));
    }

    #[test]
    fn test_from_bytes_incomplete() {
        let data = [0, 0, 0, 20, 4, 0x48, 0x65];
        let result = Packet::from_bytes(&data);
        match result {
            Err(MirageError::Protocol(msg)) => assert!(msg.contains("Incomplete packet")),
            other => panic!("Expected Protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_from_bytes_trailing_data() {
        let mut bytes = Packet::new(MessageType::Ignore, Vec::new()).to_bytes();
        bytes.push(0xaa);
        assert!(matches!(
            Packet::from_bytes(&bytes),
            Err(MirageError::Protocol(_))
        ));
    }
}
