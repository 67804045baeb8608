//! Server facade and in-process connections.

use crate::config::ServerConfig;
use crate::handler::{Dispatch, RequestHandler};
use crate::registry::RoomRegistry;
use coedit_protocol::{Leave, SiteId, WireMessage};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

type Mailbox = Arc<Mutex<VecDeque<WireMessage>>>;

/// The collaboration server.
///
/// Holds the room registry and a mailbox per connected replica so
/// broadcasts can be routed. The server is transport-agnostic: a network
/// front end would decode frames, feed them through a [`Replica`], and
/// flush mailboxes back out; tests drive the same path in-process.
pub struct CollabServer {
    handler: RequestHandler,
    registry: Arc<RoomRegistry>,
    mailboxes: RwLock<HashMap<(Uuid, SiteId), Mailbox>>,
}

impl CollabServer {
    /// Creates a server with the given configuration.
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(RoomRegistry::new(config));
        Self {
            handler: RequestHandler::new(Arc::clone(&registry)),
            registry,
            mailboxes: RwLock::new(HashMap::new()),
        }
    }

    /// Opens an in-process connection handle.
    pub fn open_replica(self: &Arc<Self>) -> Replica {
        Replica {
            server: Arc::clone(self),
            mailbox: Arc::new(Mutex::new(VecDeque::new())),
            identity: RwLock::new(None),
        }
    }

    /// Number of live rooms.
    pub fn room_count(&self) -> usize {
        self.registry.len()
    }

    /// The room registry.
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Sweeps expired presence in every room and notifies connected
    /// replicas with leave messages. Returns the number of expired users.
    pub fn sweep_presence(&self, now_ms: u64) -> usize {
        let mut expired_total = 0;
        for room in self.registry.rooms() {
            for user_id in room.sweep_presence(now_ms) {
                expired_total += 1;
                let notice = WireMessage::Leave(Leave {
                    room_id: room.id(),
                    user_id,
                });
                self.route(room.id(), &room.member_sites(), &notice);
            }
        }
        expired_total
    }

    fn route(&self, room_id: Uuid, recipients: &[SiteId], message: &WireMessage) {
        let mailboxes = self.mailboxes.read();
        for &site in recipients {
            if let Some(mailbox) = mailboxes.get(&(room_id, site)) {
                mailbox.lock().push_back(message.clone());
            }
        }
    }
}

/// An explicit per-connection handle onto the server.
///
/// A replica sends requests, receives at most one direct reply each, and
/// accumulates room broadcasts in its mailbox until drained. Its mailbox is
/// registered under the site id the join handshake assigns.
pub struct Replica {
    server: Arc<CollabServer>,
    mailbox: Mailbox,
    identity: RwLock<Option<(Uuid, SiteId)>>,
}

impl Replica {
    /// Sends a message, stamped with the current wall clock.
    pub fn request(
        &self,
        message: WireMessage,
    ) -> crate::error::ServerResult<Option<WireMessage>> {
        self.request_at(message, unix_millis())
    }

    /// Sends a message with an explicit timestamp.
    pub fn request_at(
        &self,
        message: WireMessage,
        now_ms: u64,
    ) -> crate::error::ServerResult<Option<WireMessage>> {
        let join_room = match &message {
            WireMessage::JoinRequest(request) => Some(request.room_id),
            _ => None,
        };

        match self.server.handler.handle(message, now_ms)? {
            Dispatch::Reply(reply) => {
                if let (Some(room_id), WireMessage::JoinResponse(response)) = (join_room, &reply) {
                    self.register(room_id, response.site_id);
                }
                Ok(Some(reply))
            }
            Dispatch::Broadcast {
                room_id,
                recipients,
                message,
            } => {
                self.server.route(room_id, &recipients, &message);
                Ok(None)
            }
            Dispatch::Ignored => Ok(None),
        }
    }

    /// Drains broadcasts queued for this connection.
    pub fn poll(&self) -> Vec<WireMessage> {
        self.mailbox.lock().drain(..).collect()
    }

    /// The site id assigned at join, if joined.
    pub fn site_id(&self) -> Option<SiteId> {
        (*self.identity.read()).map(|(_, site)| site)
    }

    /// Unregisters the mailbox. Queued broadcasts are dropped.
    pub fn close(&self) {
        if let Some(identity) = self.identity.write().take() {
            self.server.mailboxes.write().remove(&identity);
        }
    }

    fn register(&self, room_id: Uuid, site_id: SiteId) {
        let mut identity = self.identity.write();
        let mut mailboxes = self.server.mailboxes.write();
        if let Some(previous) = identity.take() {
            mailboxes.remove(&previous);
        }
        mailboxes.insert((room_id, site_id), Arc::clone(&self.mailbox));
        *identity = Some((room_id, site_id));
    }
}

impl Drop for Replica {
    fn drop(&mut self) {
        self.close();
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
