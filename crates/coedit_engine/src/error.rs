//! Error types for the session engine.

use thiserror::Error;

/// Result type for session operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while driving a collaborative session.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Wire protocol error (encode/decode or version mismatch).
    #[error("protocol error: {0}")]
    Protocol(#[from] coedit_protocol::ProtocolError),

    /// Local document error on an edit.
    #[error("document error: {0}")]
    Document(#[from] coedit_doc::DocError),

    /// The server rejected a request.
    #[error("rejected by server: {0}")]
    Rejected(String),

    /// No session has been established yet.
    #[error("not connected to a room")]
    NotConnected,

    /// Invalid state transition.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// The transport did not answer in time.
    #[error("operation timed out")]
    Timeout,
}

impl EngineError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Transport { retryable, .. } => *retryable,
            EngineError::Timeout => true,
            _ => false,
        }
    }
}
