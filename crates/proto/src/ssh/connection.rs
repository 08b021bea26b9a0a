//! SSH connection protocol messages (RFC 4254) used by the mock.
//!
//! Parsing is deliberately lenient: only the fields the mock acts on are
//! required, and request-specific data is kept raw. A length-prefixed field
//! that runs past the payload is still a hard [`MirageError::MalformedPayload`].
//!
//! All `from_payload` constructors take the payload *without* the message
//! type byte, as produced by [`Packet::decode`](crate::ssh::Packet::decode).
//!
//! # Example
//!
//! ```rust
//! use mirage_proto::ssh::connection::{ChannelData, ChannelOpenConfirmation};
//!
//! let confirm = ChannelOpenConfirmation::new(7, 7, 32768, 32768);
//! assert_eq!(confirm.to_packet().payload().len(), 16);
//!
//! let data = ChannelData::new(7, b"hello".to_vec());
//! let parsed = ChannelData::from_payload(data.to_packet().payload()).unwrap();
//! assert_eq!(parsed.data(), b"hello");
//! ```

use crate::ssh::message::MessageType;
use crate::ssh::packet::Packet;
use crate::ssh::wire::{read_bool, read_bytes, read_string, read_u32, write_bool, write_bytes, write_string};
use bytes::{BufMut, BytesMut};
use mirage_platform::MirageResult;

/// Window size advertised in every CHANNEL_OPEN_CONFIRMATION.
pub const CHANNEL_WINDOW_SIZE: u32 = 32768;

/// Maximum packet size advertised in every CHANNEL_OPEN_CONFIRMATION.
pub const CHANNEL_MAX_PACKET: u32 = 32768;

/// SSH_MSG_CHANNEL_OPEN (RFC 4254 Section 5.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOpen {
    channel_type: String,
    sender_channel: u32,
    initial_window_size: Option<u32>,
    maximum_packet_size: Option<u32>,
}

impl ChannelOpen {
    /// Returns the channel type (e.g. "session").
    pub fn channel_type(&self) -> &str {
        &self.channel_type
    }

    /// Returns the sender's channel number.
    pub fn sender_channel(&self) -> u32 {
        self.sender_channel
    }

    /// Returns the peer's initial window, if it sent one.
    pub fn initial_window_size(&self) -> Option<u32> {
        self.initial_window_size
    }

    /// Returns the peer's maximum packet size, if it sent one.
    pub fn maximum_packet_size(&self) -> Option<u32> {
        self.maximum_packet_size
    }

    /// Parses the payload.
    ///
    /// ```text
    /// string    channel type
    /// uint32    sender channel
    /// uint32    initial window size   (optional here)
    /// uint32    maximum packet size   (optional here)
    /// ```
    pub fn from_payload(data: &[u8]) -> MirageResult<Self> {
        let mut offset = 0;
        let channel_type = read_string(data, &mut offset)?;
        let sender_channel = read_u32(data, &mut offset)?;
        let initial_window_size = read_u32(data, &mut offset).ok();
        let maximum_packet_size = initial_window_size.and_then(|_| read_u32(data, &mut offset).ok());

        Ok(Self {
            channel_type,
            sender_channel,
            initial_window_size,
            maximum_packet_size,
        })
    }
}

/// SSH_MSG_CHANNEL_OPEN_CONFIRMATION (RFC 4254 Section 5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOpenConfirmation {
    recipient_channel: u32,
    sender_channel: u32,
    initial_window_size: u32,
    maximum_packet_size: u32,
}

impl ChannelOpenConfirmation {
    /// Creates a new confirmation.
    pub fn new(
        recipient_channel: u32,
        sender_channel: u32,
        initial_window_size: u32,
        maximum_packet_size: u32,
    ) -> Self {
        Self {
            recipient_channel,
            sender_channel,
            initial_window_size,
            maximum_packet_size,
        }
    }

    /// Returns the recipient channel number.
    pub fn recipient_channel(&self) -> u32 {
        self.recipient_channel
    }

    /// Returns our (sender) channel number.
    pub fn sender_channel(&self) -> u32 {
        self.sender_channel
    }

    /// Builds the outbound packet.
    pub fn to_packet(&self) -> Packet {
        let mut buf = BytesMut::with_capacity(16);
        buf.put_u32(self.recipient_channel);
        buf.put_u32(self.sender_channel);
        buf.put_u32(self.initial_window_size);
        buf.put_u32(self.maximum_packet_size);
        Packet::new(MessageType::ChannelOpenConfirmation, buf.to_vec())
    }

    /// Parses the payload.
    pub fn from_payload(data: &[u8]) -> MirageResult<Self> {
        let mut offset = 0;
        Ok(Self {
            recipient_channel: read_u32(data, &mut offset)?,
            sender_channel: read_u32(data, &mut offset)?,
            initial_window_size: read_u32(data, &mut offset)?,
            maximum_packet_size: read_u32(data, &mut offset)?,
        })
    }
}

/// SSH_MSG_CHANNEL_DATA (RFC 4254 Section 5.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelData {
    recipient_channel: u32,
    data: Vec<u8>,
}

impl ChannelData {
    /// Creates a new data message.
    pub fn new(recipient_channel: u32, data: Vec<u8>) -> Self {
        Self {
            recipient_channel,
            data,
        }
    }

    /// Returns the recipient channel number.
    pub fn recipient_channel(&self) -> u32 {
        self.recipient_channel
    }

    /// Returns the data.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the message, returning the data.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Builds the outbound packet.
    pub fn to_packet(&self) -> Packet {
        let mut buf = BytesMut::with_capacity(8 + self.data.len());
        buf.put_u32(self.recipient_channel);
        write_bytes(&mut buf, &self.data);
        Packet::new(MessageType::ChannelData, buf.to_vec())
    }

    /// Parses the payload.
    pub fn from_payload(data: &[u8]) -> MirageResult<Self> {
        let mut offset = 0;
        let recipient_channel = read_u32(data, &mut offset)?;
        let bytes = read_bytes(data, &mut offset)?;
        Ok(Self {
            recipient_channel,
            data: bytes.to_vec(),
        })
    }
}

/// SSH_MSG_CHANNEL_CLOSE (RFC 4254 Section 5.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelClose {
    recipient_channel: u32,
}

impl ChannelClose {
    /// Creates a new close message.
    pub fn new(recipient_channel: u32) -> Self {
        Self { recipient_channel }
    }

    /// Returns the recipient channel number.
    pub fn recipient_channel(&self) -> u32 {
        self.recipient_channel
    }

    /// Builds the outbound packet.
    pub fn to_packet(&self) -> Packet {
        Packet::new(
            MessageType::ChannelClose,
            self.recipient_channel.to_be_bytes().to_vec(),
        )
    }

    /// Parses the payload.
    pub fn from_payload(data: &[u8]) -> MirageResult<Self> {
        let mut offset = 0;
        Ok(Self {
            recipient_channel: read_u32(data, &mut offset)?,
        })
    }
}

/// SSH_MSG_CHANNEL_REQUEST (RFC 4254 Section 5.4).
///
/// The request type is kept as a string so that any request ("pty-req",
/// "env", "shell", "exec", "subsystem", ...) is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRequest {
    recipient_channel: u32,
    request_type: String,
    want_reply: bool,
    type_specific: Vec<u8>,
}

impl ChannelRequest {
    /// Request type that triggers the exit-status/close sequence.
    pub const EXEC: &'static str = "exec";

    /// Request type carrying a process exit code.
    pub const EXIT_STATUS: &'static str = "exit-status";

    /// Creates a request with raw type-specific data.
    pub fn new(
        recipient_channel: u32,
        request_type: impl Into<String>,
        want_reply: bool,
        type_specific: Vec<u8>,
    ) -> Self {
        Self {
            recipient_channel,
            request_type: request_type.into(),
            want_reply,
            type_specific,
        }
    }

    /// Creates an "exit-status" request (never wants a reply).
    pub fn exit_status(recipient_channel: u32, status: u32) -> Self {
        Self::new(
            recipient_channel,
            Self::EXIT_STATUS,
            false,
            status.to_be_bytes().to_vec(),
        )
    }

    /// Returns the recipient channel number.
    pub fn recipient_channel(&self) -> u32 {
        self.recipient_channel
    }

    /// Returns the request type name.
    pub fn request_type(&self) -> &str {
        &self.request_type
    }

    /// Returns whether the sender wants a reply.
    pub fn want_reply(&self) -> bool {
        self.want_reply
    }

    /// Returns the raw type-specific data.
    pub fn type_specific(&self) -> &[u8] {
        &self.type_specific
    }

    /// Returns true for an "exec" request.
    pub fn is_exec(&self) -> bool {
        self.request_type == Self::EXEC
    }

    /// Returns the command of an "exec" request, if one is present.
    pub fn exec_command(&self) -> Option<String> {
        if !self.is_exec() {
            return None;
        }
        let mut offset = 0;
        read_string(&self.type_specific, &mut offset).ok()
    }

    /// Returns the code of an "exit-status" request.
    pub fn exit_code(&self) -> Option<u32> {
        if self.request_type != Self::EXIT_STATUS {
            return None;
        }
        let mut offset = 0;
        read_u32(&self.type_specific, &mut offset).ok()
    }

    /// Builds the outbound packet.
    pub fn to_packet(&self) -> Packet {
        let mut buf = BytesMut::new();
        buf.put_u32(self.recipient_channel);
        write_string(&mut buf, &self.request_type);
        write_bool(&mut buf, self.want_reply);
        buf.put_slice(&self.type_specific);
        Packet::new(MessageType::ChannelRequest, buf.to_vec())
    }

    /// Parses the payload.
    ///
    /// ```text
    /// uint32    recipient channel
    /// string    request type
    /// boolean   want reply
    /// ....      type-specific data (kept raw)
    /// ```
    pub fn from_payload(data: &[u8]) -> MirageResult<Self> {
        let mut offset = 0;
        let recipient_channel = read_u32(data, &mut offset)?;
        let request_type = read_string(data, &mut offset)?;
        let want_reply = read_bool(data, &mut offset)?;

        Ok(Self {
            recipient_channel,
            request_type,
            want_reply,
            type_specific: data[offset..].to_vec(),
        })
    }
}

/// SSH_MSG_CHANNEL_SUCCESS (RFC 4254 Section 5.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSuccess {
    recipient_channel: u32,
}

impl ChannelSuccess {
    /// Creates a new success message.
    pub fn new(recipient_channel: u32) -> Self {
        Self { recipient_channel }
    }

    /// Returns the recipient channel number.
    pub fn recipient_channel(&self) -> u32 {
        self.recipient_channel
    }

    /// Builds the outbound packet.
    pub fn to_packet(&self) -> Packet {
        Packet::new(
            MessageType::ChannelSuccess,
            self.recipient_channel.to_be_bytes().to_vec(),
        )
    }
}
