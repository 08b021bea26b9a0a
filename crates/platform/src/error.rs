//! Error types for Mirage

use thiserror::Error;

/// Unified error type for all Mirage operations
#[derive(Debug, Error)]
pub enum MirageError {
    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Frame header is inconsistent with its body: the padding would
    /// swallow the message type byte or leave a negative-length payload.
    #[error("Frame decode error: padding length {padding_length} does not fit in body of {body_length} bytes")]
    FrameDecode {
        /// Declared padding length
        padding_length: u8,
        /// Body length derived from the header
        body_length: usize,
    },

    /// A length-prefixed field runs past the end of the payload
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Peer identification line exceeded the configured maximum
    #[error("Identification line exceeds {0} bytes")]
    IdentificationTooLong(usize),

    /// Declared packet length exceeds the configured maximum
    #[error("Packet too large: {length} bytes (maximum {max})")]
    PacketTooLarge {
        /// Declared length
        length: usize,
        /// Configured limit
        max: usize,
    },
}

impl MirageError {
    /// Returns true for errors caused by bytes the peer sent, as opposed
    /// to local I/O or configuration faults.
    pub fn is_peer_fault(&self) -> bool {
        matches!(
            self,
            MirageError::Protocol(_)
                | MirageError::FrameDecode { .. }
                | MirageError::MalformedPayload(_)
                | MirageError::IdentificationTooLong(_)
                | MirageError::PacketTooLarge { .. }
        )
    }
}

/// Result type for Mirage operations
pub type MirageResult<T> = Result<T, MirageError>;
