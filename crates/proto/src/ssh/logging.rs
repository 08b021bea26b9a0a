//! Structured logging for mock sessions
//!
//! Thin wrappers over `tracing` so every session event carries the same
//! field names (`peer`, `msg_type`, `seq`, `len`). Payloads are logged as a
//! short hex preview at TRACE level only.
//!
//! # Log Levels
//!
//! - **TRACE**: payload previews
//! - **DEBUG**: every packet in and out
//! - **INFO**: connection open/close, identification lines
//! - **WARN**: connections that ended with an error
//!
//! # Example
//!
//! ```no_run
//! use mirage_proto::ssh::logging;
//!
//! tracing_subscriber::fmt()
//!     .with_env_filter("mirage_proto=debug")
//!     .init();
//!
//! logging::log_connection_open("127.0.0.1:50000");
//! ```

use crate::ssh::message::describe;
use crate::ssh::packet::Packet;
use mirage_platform::MirageError;
use tracing::{debug, info, trace, warn};

/// Payload bytes shown in hex previews.
pub const PREVIEW_LEN: usize = 32;

/// Hex encoding of at most [`PREVIEW_LEN`] bytes, with `..` if truncated.
pub fn hex_preview(bytes: &[u8]) -> String {
    if bytes.len() > PREVIEW_LEN {
        format!("{}..", hex::encode(&bytes[..PREVIEW_LEN]))
    } else {
        hex::encode(bytes)
    }
}

/// Log accepted connection
pub fn log_connection_open(peer: &str) {
    info!(peer = peer, "Connection accepted");
}

/// Log identification exchange
///
/// # Arguments
///
/// * `peer` - Peer address
/// * `peer_line` - Identification line the peer sent, without CR LF
/// * `software` - Parsed software id, if the line was well formed
pub fn log_version_exchanged(peer: &str, peer_line: &str, software: Option<&str>) {
    info!(
        peer = peer,
        peer_version = %peer_line.escape_default(),
        software = software.unwrap_or("-"),
        "Version exchange complete"
    );
}

/// Log inbound packet
pub fn log_packet_received(peer: &str, seq: u32, packet: &Packet) {
    debug!(
        peer = peer,
        seq = seq,
        msg_type = %describe(packet.message_type()),
        len = packet.payload().len(),
        "Packet received"
    );
    trace!(peer = peer, payload = %hex_preview(packet.payload()), "Inbound payload");
}

/// Log outbound packet
pub fn log_packet_sent(peer: &str, packet: &Packet) {
    debug!(
        peer = peer,
        msg_type = %describe(packet.message_type()),
        len = packet.payload().len(),
        "Packet sent"
    );
    trace!(peer = peer, payload = %hex_preview(packet.payload()), "Outbound payload");
}

/// Log orderly connection end
///
/// # Arguments
///
/// * `peer` - Peer address
/// * `reason` - How the session ended
/// * `received` - Packets received
/// * `sent` - Packets sent
pub fn log_connection_closed(peer: &str, reason: &str, received: u32, sent: u32) {
    info!(
        peer = peer,
        reason = reason,
        packets_received = received,
        packets_sent = sent,
        "Connection closed"
    );
}

/// Log connection that ended with an error
pub fn log_connection_failed(peer: &str, error: &MirageError) {
    warn!(
        peer = peer,
        error = %error,
        peer_fault = error.is_peer_fault(),
        "Connection aborted"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::message::MessageType;

    #[test]
    fn test_hex_preview_short() {
        assert_eq!(hex_preview(&[0xde, 0xad, 0xbe, 0xef]), "deadbeef");
        assert_eq!(hex_preview(&[]), "");
    }

    #[test]
    fn test_hex_preview_truncates() {
        let preview = hex_preview(&[0xab; 40]);
        assert_eq!(preview.len(), PREVIEW_LEN * 2 + 2);
        assert!(preview.ends_with(".."));
    }

    #[test]
    fn test_logging_functions_do_not_panic() {
        let packet = Packet::new(MessageType::ChannelData, vec![0; 64]);
        log_connection_open("127.0.0.1:1");
        log_version_exchanged("127.0.0.1:1", "SSH-2.0-Test", Some("Test"));
        log_version_exchanged("127.0.0.1:1", "garbage\u{1b}", None);
        log_packet_received("127.0.0.1:1", 0, &packet);
        log_packet_sent("127.0.0.1:1", &packet);
        log_connection_closed("127.0.0.1:1", "peer closed", 1, 1);
        log_connection_failed("127.0.0.1:1", &MirageError::Protocol("x".into()));
    }
}
