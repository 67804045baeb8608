//! Room lookup and lifecycle.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::room::Room;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Maps room ids to live [`Room`]s.
///
/// Rooms are created on first join, capped by `max_rooms`, and handed out
/// as `Arc` so handlers and connections hold explicit references instead of
/// reaching into shared globals.
pub struct RoomRegistry {
    config: ServerConfig,
    rooms: RwLock<HashMap<Uuid, Arc<Room>>>,
}

impl RoomRegistry {
    /// Creates an empty registry.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the room, creating it if this is the first join.
    pub fn get_or_create(&self, room_id: Uuid) -> ServerResult<Arc<Room>> {
        if let Some(room) = self.rooms.read().get(&room_id) {
            return Ok(Arc::clone(room));
        }

        let mut rooms = self.rooms.write();
        // Racing creators settle on whichever inserted first.
        if let Some(room) = rooms.get(&room_id) {
            return Ok(Arc::clone(room));
        }
        if rooms.len() >= self.config.max_rooms {
            return Err(ServerError::RoomLimitExceeded {
                max: self.config.max_rooms,
            });
        }
        let room = Arc::new(Room::new(room_id, self.config.clone()));
        rooms.insert(room_id, Arc::clone(&room));
        tracing::debug!(%room_id, "room created");
        Ok(room)
    }

    /// Returns an existing room.
    pub fn get(&self, room_id: Uuid) -> ServerResult<Arc<Room>> {
        self.rooms
            .read()
            .get(&room_id)
            .cloned()
            .ok_or(ServerError::UnknownRoom(room_id))
    }

    /// All live rooms.
    pub fn rooms(&self) -> Vec<Arc<Room>> {
        self.rooms.read().values().cloned().collect()
    }

    /// Number of live rooms.
    pub fn len(&self) -> usize {
        self.rooms.read().len()
    }

    /// Returns true if no rooms are hosted.
    pub fn is_empty(&self) -> bool {
        self.rooms.read().is_empty()
    }
}
