//! Mock SSH server (RFC 4251-4254, cleartext only).
//!
//! This module emulates just enough of the SSH transport, authentication
//! and connection protocols to walk a client under test through a complete
//! session. Key exchange is a no-op and every packet stays in cleartext
//! framing for the whole connection.
//!
//! # Architecture
//!
//! Leaves first:
//!
//! 1. **Packet codec** ([`packet`]) - binary packet framing (RFC 4253 Section 6)
//! 2. **Transport** ([`transport`]) - exact reads, identification line, packet I/O
//! 3. **Channel table** ([`channel`]) - per-connection channel id mapping
//! 4. **Dispatcher** ([`dispatcher`]) - the mock reply policy for each message type
//! 5. **Server** ([`server`]) - version exchange, packet loop, acceptor
//!
//! Message bodies live in [`auth`], [`connection`] and [`transport`]; the
//! key exchange capability in [`kex`].
//!
//! # Example
//!
//! ```rust
//! use mirage_proto::ssh::{MessageType, Packet};
//!
//! let packet = Packet::new(MessageType::NewKeys, Vec::new());
//! let wire = packet.to_bytes();
//! assert_eq!(wire, [0, 0, 0, 6, 4, 21, 0, 0, 0, 0]);
//!
//! let parsed = Packet::from_bytes(&wire).unwrap();
//! assert_eq!(parsed.kind(), Some(MessageType::NewKeys));
//! ```
//!
//! # References
//!
//! - [RFC 4252](https://datatracker.ietf.org/doc/html/rfc4252) - SSH Authentication Protocol
//! - [RFC 4253](https://datatracker.ietf.org/doc/html/rfc4253) - SSH Transport Layer Protocol
//! - [RFC 4254](https://datatracker.ietf.org/doc/html/rfc4254) - SSH Connection Protocol

pub mod auth;
pub mod channel;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod kex;
pub mod logging;
pub mod message;
pub mod packet;
pub mod server;
pub mod transport;
pub mod version;
mod wire;

// Re-export main types
pub use auth::{classify, AuthKind, AuthMarkers, AuthPkOk, ServiceAccept, ServiceRequest};
pub use channel::{Channel, ChannelIdPolicy, ChannelTable};
pub use config::{MockServerConfig, MockServerConfigBuilder, UnknownMessagePolicy};
pub use connection::{
    ChannelClose, ChannelData, ChannelOpen, ChannelOpenConfirmation, ChannelRequest,
    ChannelSuccess, CHANNEL_MAX_PACKET, CHANNEL_WINDOW_SIZE,
};
pub use dispatcher::{ConnectionContext, Dispatch, MessageDispatcher, NextStep};
pub use kex::{Cleartext, KeyExchange};
pub use message::MessageType;
pub use packet::{Packet, PacketHeader, MAX_PACKET_SIZE};
pub use server::{handle_stream, MockServer, Session, SessionEnd, SessionReport, SessionState};
pub use transport::{Disconnect, InboundPacket, ReadOutcome, Transport, Unimplemented};
pub use version::Version;
