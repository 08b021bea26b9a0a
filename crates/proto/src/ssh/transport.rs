//! Cleartext transport over a duplex byte stream.
//!
//! [`Transport`] owns the stream for one connection and provides the three
//! reads the session needs: the CR LF terminated identification line, one
//! framed packet, and the raw exact-length read both are built on. A peer
//! that hangs up mid-read surfaces as [`ReadOutcome::Closed`] instead of an
//! error, so the session can tell an ordinary goodbye from a broken frame.
//!
//! The module also carries the two transport-layer messages the server
//! emits itself: [`Disconnect`] and [`Unimplemented`] (RFC 4253 Sections
//! 11.1 and 11.4).

use crate::ssh::message::MessageType;
use crate::ssh::packet::{Packet, PacketHeader, HEADER_LEN};
use crate::ssh::wire::{read_string, read_u32, write_string};
use bytes::{BufMut, BytesMut};
use mirage_platform::{MirageError, MirageResult};
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// SSH_DISCONNECT_PROTOCOL_ERROR reason code.
pub const DISCONNECT_PROTOCOL_ERROR: u32 = 2;

/// SSH_DISCONNECT_BY_APPLICATION reason code.
pub const DISCONNECT_BY_APPLICATION: u32 = 11;

/// Result of a read that may hit end-of-stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome<T> {
    /// The read completed.
    Data(T),
    /// The peer closed or reset the stream before the read completed.
    Closed,
}

impl<T> ReadOutcome<T> {
    /// Returns the value, or `None` if the stream closed.
    pub fn data(self) -> Option<T> {
        match self {
            ReadOutcome::Data(value) => Some(value),
            ReadOutcome::Closed => None,
        }
    }

    /// Returns `true` for [`ReadOutcome::Closed`].
    pub fn is_closed(&self) -> bool {
        matches!(self, ReadOutcome::Closed)
    }
}

/// A decoded inbound packet with its transport sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundPacket {
    /// Sequence number, counted from zero per direction (RFC 4253 Section 6.4).
    pub sequence: u32,
    /// The decoded packet.
    pub packet: Packet,
}

/// Cleartext packet transport for one connection.
#[derive(Debug)]
pub struct Transport<S> {
    stream: S,
    recv_sequence: u32,
    send_sequence: u32,
    bytes_read: u64,
    bytes_written: u64,
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            recv_sequence: 0,
            send_sequence: 0,
            bytes_read: 0,
            bytes_written: 0,
        }
    }

    /// Reads exactly `n` bytes.
    ///
    /// End-of-stream, connection reset, and connection abort before `n`
    /// bytes arrive all yield [`ReadOutcome::Closed`]. Other I/O failures
    /// are errors.
    pub async fn read_exact(&mut self, n: usize) -> MirageResult<ReadOutcome<Vec<u8>>> {
        let mut buf = vec![0u8; n];
        match self.stream.read_exact(&mut buf).await {
            Ok(_) => {
                self.bytes_read += n as u64;
                Ok(ReadOutcome::Data(buf))
            }
            Err(e) if is_stream_closed(&e) => Ok(ReadOutcome::Closed),
            Err(e) => Err(MirageError::Io(e)),
        }
    }

    /// Reads the peer identification line one byte at a time.
    ///
    /// Returns the line without its terminator. A bare LF is accepted as
    /// well as CR LF. Lines longer than `max_len` bytes (terminator
    /// included) fail with [`MirageError::IdentificationTooLong`].
    pub async fn read_identification(
        &mut self,
        max_len: usize,
    ) -> MirageResult<ReadOutcome<String>> {
        let mut line = Vec::new();

        loop {
            let byte = match self.read_exact(1).await? {
                ReadOutcome::Data(b) => b[0],
                ReadOutcome::Closed => return Ok(ReadOutcome::Closed),
            };
            line.push(byte);

            if byte == b'\n' {
                break;
            }
            if line.len() >= max_len {
                return Err(MirageError::IdentificationTooLong(line.len()));
            }
        }

        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }

        Ok(ReadOutcome::Data(String::from_utf8_lossy(&line).into_owned()))
    }

    /// Writes our identification line, terminator included.
    pub async fn write_identification(&mut self, line: &[u8]) -> MirageResult<()> {
        self.stream.write_all(line).await?;
        self.stream.flush().await?;
        self.bytes_written += line.len() as u64;
        Ok(())
    }

    /// Reads and decodes one packet.
    ///
    /// A `total_length` above `max_len` is rejected from the header alone,
    /// before the body is allocated.
    pub async fn read_packet(&mut self, max_len: usize) -> MirageResult<ReadOutcome<InboundPacket>> {
        let header = match self.read_exact(HEADER_LEN).await? {
            ReadOutcome::Data(bytes) => {
                let mut raw = [0u8; HEADER_LEN];
                raw.copy_from_slice(&bytes);
                PacketHeader::parse(raw)
            }
            ReadOutcome::Closed => return Ok(ReadOutcome::Closed),
        };

        let total_length = header.total_length() as usize;
        if total_length > max_len {
            return Err(MirageError::PacketTooLarge {
                length: total_length,
                max: max_len,
            });
        }

        let body = match self.read_exact(header.body_length()).await? {
            ReadOutcome::Data(body) => body,
            ReadOutcome::Closed => return Ok(ReadOutcome::Closed),
        };

        let packet = Packet::decode(&header, &body)?;
        let sequence = self.recv_sequence;
        self.recv_sequence = self.recv_sequence.wrapping_add(1);

        Ok(ReadOutcome::Data(InboundPacket { sequence, packet }))
    }

    /// Encodes and writes one packet.
    pub async fn write_packet(&mut self, packet: &Packet) -> MirageResult<()> {
        let bytes = packet.to_bytes();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.send_sequence = self.send_sequence.wrapping_add(1);
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }

    /// Shuts down the write half. A peer that is already gone is not an error.
    pub async fn shutdown(&mut self) -> MirageResult<()> {
        match self.stream.shutdown().await {
            Ok(()) => Ok(()),
            Err(e) if is_stream_closed(&e) || e.kind() == ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(MirageError::Io(e)),
        }
    }

    /// Packets decoded so far.
    pub fn packets_received(&self) -> u32 {
        self.recv_sequence
    }

    /// Packets written so far.
    pub fn packets_sent(&self) -> u32 {
        self.send_sequence
    }

    /// Bytes read from the stream, identification line included.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Bytes written to the stream, identification line included.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Returns the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

fn is_stream_closed(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
    )
}

/// SSH_MSG_DISCONNECT.
///
/// ```text
/// byte      SSH_MSG_DISCONNECT
/// uint32    reason code
/// string    description
/// string    language tag
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnect {
    reason_code: u32,
    description: String,
    language_tag: String,
}

impl Disconnect {
    /// Creates a disconnect message.
    pub fn new(reason_code: u32, description: impl Into<String>) -> Self {
        Self {
            reason_code,
            description: description.into(),
            language_tag: String::new(),
        }
    }

    /// Reason code.
    pub fn reason_code(&self) -> u32 {
        self.reason_code
    }

    /// Human-readable description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Parses a DISCONNECT payload.
    ///
    /// Clients under test often send the message with an empty body, so
    /// every field is optional. A field that is present but truncated is
    /// still an error.
    pub fn from_payload(payload: &[u8]) -> MirageResult<Self> {
        let mut offset = 0;
        let mut msg = Self::new(0, "");

        if payload.is_empty() {
            return Ok(msg);
        }
        msg.reason_code = read_u32(payload, &mut offset)?;
        if offset < payload.len() {
            msg.description = read_string(payload, &mut offset)?;
        }
        if offset < payload.len() {
            msg.language_tag = read_string(payload, &mut offset)?;
        }
        Ok(msg)
    }

    /// Encodes the message as a packet.
    pub fn to_packet(&self) -> Packet {
        let mut buf = BytesMut::with_capacity(12 + self.description.len());
        buf.put_u32(self.reason_code);
        write_string(&mut buf, &self.description);
        write_string(&mut buf, &self.language_tag);
        Packet::new(MessageType::Disconnect, buf.to_vec())
    }
}

/// SSH_MSG_UNIMPLEMENTED: `uint32 packet sequence number of rejected message`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unimplemented {
    sequence_number: u32,
}

impl Unimplemented {
    /// Creates the reply for the packet with the given sequence number.
    pub fn new(sequence_number: u32) -> Self {
        Self { sequence_number }
    }

    /// Sequence number of the rejected packet.
    pub fn sequence_number(&self) -> u32 {
        self.sequence_number
    }

    /// Parses an UNIMPLEMENTED payload.
    pub fn from_payload(payload: &[u8]) -> MirageResult<Self> {
        let mut offset = 0;
        Ok(Self::new(read_u32(payload, &mut offset)?))
    }

    /// Encodes the message as a packet.
    pub fn to_packet(&self) -> Packet {
        Packet::new(
            MessageType::Unimplemented,
            self.sequence_number.to_be_bytes().to_vec(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_read_exact_then_closed() {
        let (client, server) = duplex(64);
        let mut transport = Transport::new(server);
        let mut client = client;

        client.write_all(b"abc").await.unwrap();
        drop(client);

        assert_eq!(
            transport.read_exact(2).await.unwrap(),
            ReadOutcome::Data(b"ab".to_vec())
        );
        // One byte left, two requested.
        assert!(transport.read_exact(2).await.unwrap().is_closed());
    }

    #[tokio::test]
    async fn test_read_identification_crlf() {
        let (mut client, server) = duplex(256);
        let mut transport = Transport::new(server);

        client.write_all(b"SSH-2.0-Test\r\nrest").await.unwrap();

        let line = transport.read_identification(255).await.unwrap();
        assert_eq!(line, ReadOutcome::Data("SSH-2.0-Test".to_string()));
        // Nothing after the terminator is consumed.
        assert_eq!(
            transport.read_exact(4).await.unwrap(),
            ReadOutcome::Data(b"rest".to_vec())
        );
    }

    #[tokio::test]
    async fn test_read_identification_bare_lf() {
        let (mut client, server) = duplex(256);
        let mut transport = Transport::new(server);

        client.write_all(b"SSH-2.0-Lf\n").await.unwrap();
        let line = transport.read_identification(255).await.unwrap().data();
        assert_eq!(line.as_deref(), Some("SSH-2.0-Lf"));
    }

    #[tokio::test]
    async fn test_read_identification_too_long() {
        let (mut client, server) = duplex(1024);
        let mut transport = Transport::new(server);

        client.write_all(&[b'A'; 300]).await.unwrap();
        let result = transport.read_identification(255).await;
        assert!(matches!(result, Err(MirageError::IdentificationTooLong(255))));
    }

    #[tokio::test]
    async fn test_read_identification_closed() {
        let (mut client, server) = duplex(64);
        let mut transport = Transport::new(server);

        client.write_all(b"SSH-2.0-").await.unwrap();
        drop(client);
        assert!(transport.read_identification(255).await.unwrap().is_closed());
    }

    #[tokio::test]
    async fn test_read_packet_sequence() {
        let (mut client, server) = duplex(1024);
        let mut transport = Transport::new(server);

        let first = Packet::new(MessageType::Ignore, vec![]);
        let second = Packet::with_raw_type(200, b"x".to_vec());
        client.write_all(&first.to_bytes()).await.unwrap();
        client.write_all(&second.to_bytes()).await.unwrap();

        let a = transport.read_packet(35000).await.unwrap().data().unwrap();
        let b = transport.read_packet(35000).await.unwrap().data().unwrap();
        assert_eq!(a.sequence, 0);
        assert_eq!(a.packet.message_type(), 2);
        assert_eq!(b.sequence, 1);
        assert_eq!(b.packet.message_type(), 200);
        assert_eq!(b.packet.payload(), b"x");
        assert_eq!(transport.packets_received(), 2);
    }

    #[tokio::test]
    async fn test_read_packet_too_large() {
        let (mut client, server) = duplex(64);
        let mut transport = Transport::new(server);

        client.write_all(&[0x00, 0x01, 0x00, 0x00, 0x04]).await.unwrap();
        let result = transport.read_packet(35000).await;
        assert!(matches!(
            result,
            Err(MirageError::PacketTooLarge { length: 65536, max: 35000 })
        ));
    }

    #[tokio::test]
    async fn test_read_packet_bad_padding() {
        let (mut client, server) = duplex(64);
        let mut transport = Transport::new(server);

        // total_length 4, padding 3: body is 3 bytes, padding eats them all.
        client
            .write_all(&[0x00, 0x00, 0x00, 0x04, 0x03, 0x14, 0x00, 0x00])
            .await
            .unwrap();
        let result = transport.read_packet(35000).await;
        assert!(matches!(result, Err(MirageError::FrameDecode { .. })));
    }

    #[tokio::test]
    async fn test_read_packet_truncated_body() {
        let (mut client, server) = duplex(64);
        let mut transport = Transport::new(server);

        client
            .write_all(&[0x00, 0x00, 0x00, 0x10, 0x04, 0x14])
            .await
            .unwrap();
        drop(client);
        assert!(transport.read_packet(35000).await.unwrap().is_closed());
    }

    #[tokio::test]
    async fn test_write_packet_counts() {
        let (mut client, server) = duplex(1024);
        let mut transport = Transport::new(server);

        let packet = Packet::new(MessageType::NewKeys, vec![]);
        transport.write_packet(&packet).await.unwrap();
        assert_eq!(transport.packets_sent(), 1);

        let mut buf = vec![0u8; packet.to_bytes().len()];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, packet.to_bytes());
    }

    #[test]
    fn test_disconnect_roundtrip_and_empty() {
        let msg = Disconnect::new(DISCONNECT_PROTOCOL_ERROR, "unsupported message");
        let packet = msg.to_packet();
        assert_eq!(packet.message_type(), 1);
        let parsed = Disconnect::from_payload(packet.payload()).unwrap();
        assert_eq!(parsed.reason_code(), 2);
        assert_eq!(parsed.description(), "unsupported message");

        let empty = Disconnect::from_payload(&[]).unwrap();
        assert_eq!(empty.reason_code(), 0);
        assert!(Disconnect::from_payload(&[0, 0]).is_err());
    }

    #[test]
    fn test_unimplemented_payload() {
        let packet = Unimplemented::new(7).to_packet();
        assert_eq!(packet.message_type(), 3);
        assert_eq!(packet.payload(), &[0, 0, 0, 7]);
        assert_eq!(
            Unimplemented::from_payload(packet.payload())
                .unwrap()
                .sequence_number(),
            7
        );
    }
}
