//! Key exchange capability (RFC 4253 Section 7), stubbed.
//!
//! The dispatcher never builds KEXINIT or NEWKEYS payloads itself; it asks a
//! [`KeyExchange`] implementation. The shipped [`Cleartext`] exchange answers
//! with fixed dummy bytes and never derives or installs keys, so every
//! packet after NEWKEYS keeps the cleartext framing.
//!
//! # Example
//!
//! ```rust
//! use mirage_proto::ssh::kex::{Cleartext, KeyExchange, KEX_INIT_REPLY_LEN};
//!
//! let mut kex = Cleartext::new();
//! let reply = kex.kex_init_reply(b"peer algorithm lists are ignored").unwrap();
//! assert_eq!(reply.len(), KEX_INIT_REPLY_LEN);
//! assert!(kex.new_keys().unwrap().is_empty());
//! assert!(!kex.keys_active());
//! ```

use mirage_platform::MirageResult;

/// Length of the KEXINIT cookie.
pub const KEX_COOKIE_LEN: usize = 16;

/// Zero filler standing in for the ten name-lists, the
/// first_kex_packet_follows flag and the reserved word.
pub const KEX_FILLER_LEN: usize = 100;

/// Total length of the dummy KEXINIT payload.
pub const KEX_INIT_REPLY_LEN: usize = KEX_COOKIE_LEN + KEX_FILLER_LEN;

/// Produces the transport-layer replies of a key exchange.
///
/// Implementations own whatever negotiation state they need. A faithful
/// implementation would parse the peer's KEXINIT here and start deriving
/// keys on NEWKEYS.
pub trait KeyExchange: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Payload for our SSH_MSG_KEXINIT, given the peer's KEXINIT payload.
    fn kex_init_reply(&mut self, peer_kex_init: &[u8]) -> MirageResult<Vec<u8>>;

    /// Payload for our SSH_MSG_NEWKEYS.
    fn new_keys(&mut self) -> MirageResult<Vec<u8>>;

    /// Whether keys are in effect for subsequent packets.
    fn keys_active(&self) -> bool {
        false
    }
}

/// Pass-through key exchange: fixed dummy payloads, no keys ever.
#[derive(Debug, Default, Clone)]
pub struct Cleartext {
    rounds: u32,
}

impl Cleartext {
    /// Creates a new cleartext exchange.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of KEXINIT messages answered so far.
    pub fn rounds(&self) -> u32 {
        self.rounds
    }
}

impl KeyExchange for Cleartext {
    fn name(&self) -> &'static str {
        "cleartext"
    }

    fn kex_init_reply(&mut self, _peer_kex_init: &[u8]) -> MirageResult<Vec<u8>> {
        self.rounds += 1;
        Ok(vec![0u8; KEX_INIT_REPLY_LEN])
    }

    fn new_keys(&mut self) -> MirageResult<Vec<u8>> {
        Ok(Vec::new())
    }
}
