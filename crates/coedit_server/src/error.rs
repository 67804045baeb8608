//! Error types for the room server.

use coedit_protocol::SiteId;
use thiserror::Error;
use uuid::Uuid;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the room server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Malformed or out-of-contract request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The room does not exist.
    #[error("unknown room: {0}")]
    UnknownRoom(Uuid),

    /// An update arrived from a site the room never assigned.
    #[error("unknown site {site} in room {room_id}")]
    UnknownSite {
        /// Room the update targeted.
        room_id: Uuid,
        /// Unassigned site id.
        site: SiteId,
    },

    /// Protocol version mismatch on join.
    #[error("protocol version mismatch: supported={supported}, requested={requested}")]
    VersionMismatch {
        /// Version this server speaks.
        supported: u16,
        /// Version the client requested.
        requested: u16,
    },

    /// Room capacity reached.
    #[error("room limit exceeded: {max}")]
    RoomLimitExceeded {
        /// Configured maximum.
        max: usize,
    },

    /// Wire codec error.
    #[error("protocol error: {0}")]
    Protocol(#[from] coedit_protocol::ProtocolError),
}

impl ServerError {
    /// Creates an invalid-request error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Returns true if the fault lies with the client.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ServerError::RoomLimitExceeded { .. })
    }
}
