//! Service request and user authentication (RFC 4252), mock policy.
//!
//! The mock never rejects a user. Each SSH_MSG_USERAUTH_REQUEST is
//! classified on its own by substring match against two markers:
//!
//! - payload contains the **probe** marker: the client is asking whether a
//!   public key is acceptable, answered with SSH_MSG_USERAUTH_PK_OK
//!   (`ssh-ed25519`, empty key blob)
//! - payload contains the **signed** marker: answered with
//!   SSH_MSG_USERAUTH_SUCCESS
//! - anything else (password, none, keyboard-interactive): also
//!   SSH_MSG_USERAUTH_SUCCESS
//!
//! # Example
//!
//! ```rust
//! use mirage_proto::ssh::auth::{classify, AuthKind, AuthMarkers};
//!
//! let markers = AuthMarkers::default();
//! assert_eq!(classify(b"dummy_pubkey_probe", &markers), AuthKind::PublicKeyProbe);
//! assert_eq!(classify(b"dummy_signed_request", &markers), AuthKind::SignedRequest);
//! assert_eq!(classify(b"password", &markers), AuthKind::Generic);
//! ```

use crate::ssh::message::MessageType;
use crate::ssh::packet::Packet;
use crate::ssh::wire::{read_bytes, read_string, write_bytes, write_string};
use bytes::BytesMut;
use mirage_platform::{MirageError, MirageResult};
use serde::Deserialize;

/// Service name always granted in SSH_MSG_SERVICE_ACCEPT.
pub const USERAUTH_SERVICE: &str = "ssh-userauth";

/// Algorithm named in every SSH_MSG_USERAUTH_PK_OK.
pub const PK_OK_ALGORITHM: &str = "ssh-ed25519";

/// Substrings used to classify authentication requests.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AuthMarkers {
    /// Marks a public-key probe (no signature yet).
    pub probe: String,
    /// Marks a signed public-key request.
    pub signed: String,
}

impl Default for AuthMarkers {
    fn default() -> Self {
        Self {
            probe: "pubkey_probe".to_string(),
            signed: "signed_request".to_string(),
        }
    }
}

/// How a single authentication request was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKind {
    /// Public-key probe; answered with PK_OK.
    PublicKeyProbe,
    /// Signed public-key request; answered with SUCCESS.
    SignedRequest,
    /// Password or any other method; answered with SUCCESS.
    Generic,
}

impl AuthKind {
    /// Returns true if this request completes authentication.
    pub fn authenticates(&self) -> bool {
        !matches!(self, AuthKind::PublicKeyProbe)
    }
}

/// Classifies a USERAUTH_REQUEST payload. The probe marker wins if both match.
pub fn classify(payload: &[u8], markers: &AuthMarkers) -> AuthKind {
    if contains(payload, markers.probe.as_bytes()) {
        AuthKind::PublicKeyProbe
    } else if contains(payload, markers.signed.as_bytes()) {
        AuthKind::SignedRequest
    } else {
        AuthKind::Generic
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|window| window == needle)
}

/// Best-effort user name from an RFC 4252 request, for logging only.
///
/// Test clients often send free-form payloads, so failure is not an error.
pub fn user_name_hint(payload: &[u8]) -> Option<String> {
    let mut offset = 0;
    read_string(payload, &mut offset)
        .ok()
        .filter(|name| !name.is_empty() && name.chars().all(|c| !c.is_control()))
}

/// SSH_MSG_SERVICE_REQUEST (RFC 4253 Section 10).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRequest {
    service_name: String,
}

impl ServiceRequest {
    /// Returns the requested service name.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Parses the payload. An empty payload yields an empty name.
    pub fn from_payload(data: &[u8]) -> MirageResult<Self> {
        if data.is_empty() {
            return Ok(Self {
                service_name: String::new(),
            });
        }
        let mut offset = 0;
        Ok(Self {
            service_name: read_string(data, &mut offset)?,
        })
    }
}

/// SSH_MSG_SERVICE_ACCEPT (RFC 4253 Section 10).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAccept {
    service_name: String,
}

impl ServiceAccept {
    /// Creates a new accept message.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    /// Returns the accepted service name.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Builds the outbound packet.
    pub fn to_packet(&self) -> Packet {
        let mut buf = BytesMut::new();
        write_string(&mut buf, &self.service_name);
        Packet::new(MessageType::ServiceAccept, buf.to_vec())
    }
}

/// SSH_MSG_USERAUTH_PK_OK (RFC 4252 Section 7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPkOk {
    /// Public key algorithm name
    algorithm: String,
    /// Public key blob
    public_key: Vec<u8>,
}

impl AuthPkOk {
    /// Creates a new SSH_MSG_USERAUTH_PK_OK message.
    pub fn new(algorithm: impl Into<String>, public_key: Vec<u8>) -> Self {
        Self {
            algorithm: algorithm.into(),
            public_key,
        }
    }

    /// The reply sent for every probe: `ssh-ed25519` with an empty key blob.
    pub fn mock() -> Self {
        Self::new(PK_OK_ALGORITHM, Vec::new())
    }

    /// Returns the algorithm name.
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Returns the public key blob.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Builds the outbound packet.
    ///
    /// ```text
    /// string    public key algorithm name
    /// string    public key blob
    /// ```
    pub fn to_packet(&self) -> Packet {
        let mut buf = BytesMut::new();
        write_string(&mut buf, &self.algorithm);
        write_bytes(&mut buf, &self.public_key);
        Packet::new(MessageType::UserauthPkOk, buf.to_vec())
    }

    /// Parses the payload.
    pub fn from_payload(data: &[u8]) -> MirageResult<Self> {
        let mut offset = 0;
        let algorithm = read_string(data, &mut offset)?;
        let public_key = read_bytes(data, &mut offset)?.to_vec();
        if offset != data.len() {
            return Err(MirageError::MalformedPayload(format!(
                "{} trailing bytes after PK_OK",
                data.len() - offset
            )));
        }
        Ok(Self {
            algorithm,
            public_key,
        })
    }
}

/// SSH_MSG_USERAUTH_SUCCESS (empty payload).
pub fn auth_success() -> Packet {
    Packet::new(MessageType::UserauthSuccess, Vec::new())
}
