//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or validating protocol messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Message failed to encode to CBOR.
    #[error("encode error: {0}")]
    Encode(String),

    /// Message failed to decode from CBOR.
    #[error("decode error: {0}")]
    Decode(String),

    /// Message is structurally valid CBOR but violates protocol rules.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Peer speaks an incompatible protocol version.
    #[error("protocol version mismatch: local={local}, remote={remote}")]
    VersionMismatch {
        /// Local protocol version.
        local: u16,
        /// Remote protocol version.
        remote: u16,
    },
}

impl ProtocolError {
    /// Creates an invalid-message error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidMessage(message.into())
    }
}
