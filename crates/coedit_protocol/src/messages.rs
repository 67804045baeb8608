//! Protocol messages for the sync transport.

use crate::error::{ProtocolError, ProtocolResult};
use crate::id::SiteId;
use crate::operation::Operation;
use crate::presence::PresenceRecord;
use crate::state_vector::StateVector;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current protocol version. Bumped on incompatible wire changes.
pub const PROTOCOL_VERSION: u16 = 1;

/// Join handshake from a connecting session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Document (room) being joined.
    pub room_id: Uuid,
    /// Stable user identity.
    pub user_id: Uuid,
    /// Name to show to other participants.
    pub display_name: String,
    /// Protocol version the client speaks.
    pub protocol_version: u16,
}

impl JoinRequest {
    /// Creates a join request at the current protocol version.
    pub fn new(room_id: Uuid, user_id: Uuid, display_name: impl Into<String>) -> Self {
        Self {
            room_id,
            user_id,
            display_name: display_name.into(),
            protocol_version: PROTOCOL_VERSION,
        }
    }
}

/// Join confirmation from the room coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinResponse {
    /// Site identifier assigned to this session. Never reused.
    pub site_id: SiteId,
    /// Display color assigned to this session.
    pub color: String,
    /// The room's full operation history, for seeding a fresh replica.
    /// A reconnecting replica ignores duplicates via idempotent merge.
    pub snapshot: Vec<Operation>,
    /// The room's state vector at join time.
    pub state_vector: StateVector,
}

/// State-vector exchange: "here is what I have seen".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Room being synced.
    pub room_id: Uuid,
    /// Session making the request.
    pub site_id: SiteId,
    /// The requester's progress summary.
    pub state_vector: StateVector,
}

/// Catch-up batch answering a [`SyncRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResponse {
    /// Exactly the operations the requester was missing.
    pub operations: Vec<Operation>,
    /// The responder's state vector, so the requester can push back
    /// anything the responder is missing in turn.
    pub state_vector: StateVector,
}

/// A single live operation broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// Room the operation belongs to.
    pub room_id: Uuid,
    /// Session that produced the operation.
    pub site_id: SiteId,
    /// The operation itself.
    pub operation: Operation,
}

/// Fire-and-forget presence broadcast. No acknowledgment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Presence {
    /// Room the presence belongs to.
    pub room_id: Uuid,
    /// The presence record.
    pub record: PresenceRecord,
}

/// Optional leave notice; speeds up UI removal but is not required for
/// correctness (presence expires on its own).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leave {
    /// Room being left.
    pub room_id: Uuid,
    /// User leaving.
    pub user_id: Uuid,
}

/// A sync protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireMessage {
    /// Join handshake request.
    JoinRequest(JoinRequest),
    /// Join handshake response.
    JoinResponse(JoinResponse),
    /// State-vector exchange request.
    SyncRequest(SyncRequest),
    /// Catch-up response.
    SyncResponse(SyncResponse),
    /// Live operation broadcast.
    Update(Update),
    /// Presence broadcast.
    Presence(Presence),
    /// Leave notice.
    Leave(Leave),
}

impl WireMessage {
    /// Returns the message type code.
    pub fn type_code(&self) -> u8 {
        match self {
            WireMessage::JoinRequest(_) => 1,
            WireMessage::JoinResponse(_) => 2,
            WireMessage::SyncRequest(_) => 3,
            WireMessage::SyncResponse(_) => 4,
            WireMessage::Update(_) => 5,
            WireMessage::Presence(_) => 6,
            WireMessage::Leave(_) => 7,
        }
    }

    /// Encodes to CBOR bytes.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)
            .map_err(|e| ProtocolError::Encode(e.to_string()))?;
        Ok(bytes)
    }

    /// Decodes from CBOR bytes.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        ciborium::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}
