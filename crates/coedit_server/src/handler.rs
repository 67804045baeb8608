//! Message dispatch at the protocol boundary.

use crate::error::{ServerError, ServerResult};
use crate::registry::RoomRegistry;
use coedit_protocol::{SiteId, WireMessage};
use std::sync::Arc;
use uuid::Uuid;

/// What a handled message asks the connection layer to do.
#[derive(Debug)]
pub enum Dispatch {
    /// Send this reply back to the requester.
    Reply(WireMessage),
    /// Relay this message to the listed sites in the room.
    Broadcast {
        /// Room the broadcast belongs to.
        room_id: Uuid,
        /// Target sites.
        recipients: Vec<SiteId>,
        /// Message to relay.
        message: WireMessage,
    },
    /// Nothing to do (duplicate update, empty room).
    Ignored,
}

/// Dispatches wire messages to room operations.
///
/// Every message is validated here before it touches room state; malformed
/// traffic is logged and rejected so nothing downstream has an error path
/// for it.
pub struct RequestHandler {
    registry: Arc<RoomRegistry>,
}

impl RequestHandler {
    /// Creates a handler over the given registry.
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this handler serves.
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Handles one decoded message.
    pub fn handle(&self, message: WireMessage, now_ms: u64) -> ServerResult<Dispatch> {
        match message {
            WireMessage::JoinRequest(request) => {
                let room = self.registry.get_or_create(request.room_id)?;
                let response = room.join(&request, now_ms)?;
                Ok(Dispatch::Reply(WireMessage::JoinResponse(response)))
            }
            WireMessage::SyncRequest(request) => {
                let room = self.registry.get(request.room_id)?;
                let response = room.sync_diff(&request);
                Ok(Dispatch::Reply(WireMessage::SyncResponse(response)))
            }
            WireMessage::Update(update) => {
                let room = self.registry.get(update.room_id)?;
                let recipients = room.apply_update(&update)?;
                if recipients.is_empty() {
                    return Ok(Dispatch::Ignored);
                }
                Ok(Dispatch::Broadcast {
                    room_id: update.room_id,
                    recipients,
                    message: WireMessage::Update(update),
                })
            }
            WireMessage::Presence(presence) => {
                let room = self.registry.get(presence.room_id)?;
                let recipients = room.apply_presence(&presence);
                if recipients.is_empty() {
                    return Ok(Dispatch::Ignored);
                }
                Ok(Dispatch::Broadcast {
                    room_id: presence.room_id,
                    recipients,
                    message: WireMessage::Presence(presence),
                })
            }
            WireMessage::Leave(leave) => {
                let room = self.registry.get(leave.room_id)?;
                let recipients = room.leave(leave.user_id);
                if recipients.is_empty() {
                    return Ok(Dispatch::Ignored);
                }
                Ok(Dispatch::Broadcast {
                    room_id: leave.room_id,
                    recipients,
                    message: WireMessage::Leave(leave),
                })
            }
            WireMessage::JoinResponse(_) | WireMessage::SyncResponse(_) => {
                tracing::warn!(
                    type_code = message.type_code(),
                    "response message received as request"
                );
                Err(ServerError::invalid("unexpected response message"))
            }
        }
    }

    /// Decodes and handles raw CBOR bytes. Malformed input is logged and
    /// rejected without touching any room.
    pub fn handle_bytes(&self, bytes: &[u8], now_ms: u64) -> ServerResult<Dispatch> {
        let message = WireMessage::decode(bytes).map_err(|e| {
            tracing::warn!(error = %e, "dropping undecodable message");
            ServerError::Protocol(e)
        })?;
        self.handle(message, now_ms)
    }
}
