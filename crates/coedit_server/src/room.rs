//! Per-document room state.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use coedit_doc::UpdateLog;
use coedit_protocol::{
    JoinRequest, JoinResponse, Presence, PresenceRecord, SiteId, SyncRequest, SyncResponse,
    Update, PROTOCOL_VERSION,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// Display colors assigned round-robin by site id.
const COLOR_PALETTE: [&str; 8] = [
    "#e06c75", "#61afef", "#98c379", "#c678dd", "#d19a66", "#56b6c2", "#e5c07b", "#abb2bf",
];

/// A participant the room has assigned a site id to.
#[derive(Debug, Clone)]
pub struct Member {
    /// Assigned site id.
    pub site_id: SiteId,
    /// Stable user identity.
    pub user_id: Uuid,
    /// Display name announced at join.
    pub display_name: String,
    /// Assigned display color.
    pub color: String,
}

struct RoomInner {
    next_site: SiteId,
    log: UpdateLog,
    members: HashMap<SiteId, Member>,
    presence: HashMap<Uuid, PresenceRecord>,
}

/// Server-side state for one shared document.
///
/// The room is a relay, not a replica: it never materializes the text. It
/// assigns site ids (monotonic, never reused), keeps the authoritative
/// update log and state vector for catch-up, stores the latest presence
/// record per user, and computes broadcast fan-out lists. Validation
/// happens here, at the boundary; operations that pass are appended as-is.
pub struct Room {
    room_id: Uuid,
    config: ServerConfig,
    inner: RwLock<RoomInner>,
}

impl Room {
    /// Creates an empty room.
    pub fn new(room_id: Uuid, config: ServerConfig) -> Self {
        Self {
            room_id,
            config,
            inner: RwLock::new(RoomInner {
                next_site: 1,
                log: UpdateLog::new(),
                members: HashMap::new(),
                presence: HashMap::new(),
            }),
        }
    }

    /// The room's id.
    pub fn id(&self) -> Uuid {
        self.room_id
    }

    /// Admits a participant: assigns a fresh site id and color and returns
    /// the full history snapshot.
    pub fn join(&self, request: &JoinRequest, now_ms: u64) -> ServerResult<JoinResponse> {
        if request.protocol_version != PROTOCOL_VERSION {
            return Err(ServerError::VersionMismatch {
                supported: PROTOCOL_VERSION,
                requested: request.protocol_version,
            });
        }

        let mut inner = self.inner.write();
        let site_id = inner.next_site;
        inner.next_site += 1;

        let color = COLOR_PALETTE[((site_id - 1) % COLOR_PALETTE.len() as u64) as usize];
        inner.members.insert(
            site_id,
            Member {
                site_id,
                user_id: request.user_id,
                display_name: request.display_name.clone(),
                color: color.to_string(),
            },
        );
        inner.presence.insert(
            request.user_id,
            PresenceRecord::new(request.user_id, request.display_name.clone(), color, now_ms),
        );
        tracing::debug!(room_id = %self.room_id, site_id, "participant joined");

        Ok(JoinResponse {
            site_id,
            color: color.to_string(),
            snapshot: inner.log.operations().to_vec(),
            state_vector: inner.log.state_vector().clone(),
        })
    }

    /// Validates and logs a broadcast operation, returning the fan-out
    /// list. Duplicates are absorbed with an empty fan-out.
    pub fn apply_update(&self, update: &Update) -> ServerResult<Vec<SiteId>> {
        let mut inner = self.inner.write();

        if !inner.members.contains_key(&update.site_id) {
            return Err(ServerError::UnknownSite {
                room_id: self.room_id,
                site: update.site_id,
            });
        }
        if update.operation.site() != update.site_id {
            return Err(ServerError::invalid(
                "operation site does not match sender site",
            ));
        }
        update.operation.validate()?;

        let seen = inner.log.state_vector().get(update.site_id);
        if inner.log.state_vector().covers(&update.operation) {
            return Ok(Vec::new());
        }
        // Sites send their operations in counter order.
        if update.operation.id().counter != seen + 1 {
            return Err(ServerError::invalid(format!(
                "out-of-order operation from site {}: counter {} after {}",
                update.site_id,
                update.operation.id().counter,
                seen
            )));
        }

        inner.log.append(update.operation.clone());
        Ok(inner
            .members
            .keys()
            .copied()
            .filter(|&site| site != update.site_id)
            .collect())
    }

    /// Answers a state-vector catch-up request, capped at the configured
    /// batch size. The returned state vector is always the full one.
    pub fn sync_diff(&self, request: &SyncRequest) -> SyncResponse {
        let inner = self.inner.read();
        let mut operations = inner.log.diff(&request.state_vector);
        operations.truncate(self.config.max_sync_batch);
        SyncResponse {
            operations,
            state_vector: inner.log.state_vector().clone(),
        }
    }

    /// Stores a presence record (unless stale) and returns the fan-out
    /// list: every member except the sender's sites.
    pub fn apply_presence(&self, presence: &Presence) -> Vec<SiteId> {
        let mut inner = self.inner.write();
        let record = &presence.record;

        let stale = inner
            .presence
            .get(&record.user_id)
            .is_some_and(|existing| existing.last_seen_ms > record.last_seen_ms);
        if !stale {
            inner.presence.insert(record.user_id, record.clone());
        }

        inner
            .members
            .values()
            .filter(|member| member.user_id != record.user_id)
            .map(|member| member.site_id)
            .collect()
    }

    /// Removes a participant's presence, returning the fan-out list for
    /// the leave notice.
    ///
    /// Site registrations are kept: sites are never reused, and a
    /// reconnecting user may still push operations minted under a site
    /// assigned before the leave.
    pub fn leave(&self, user_id: Uuid) -> Vec<SiteId> {
        let mut inner = self.inner.write();
        inner.presence.remove(&user_id);
        inner
            .members
            .values()
            .filter(|member| member.user_id != user_id)
            .map(|member| member.site_id)
            .collect()
    }

    /// Drops presence records past the configured timeout and returns the
    /// affected users.
    pub fn sweep_presence(&self, now_ms: u64) -> Vec<Uuid> {
        let timeout_ms = self.config.presence_timeout.as_millis() as u64;
        let mut inner = self.inner.write();
        let expired: Vec<Uuid> = inner
            .presence
            .values()
            .filter(|record| record.is_expired(now_ms, timeout_ms))
            .map(|record| record.user_id)
            .collect();
        for user_id in &expired {
            inner.presence.remove(user_id);
            tracing::debug!(room_id = %self.room_id, %user_id, "presence expired");
        }
        expired
    }

    /// Sites currently registered in the room.
    pub fn member_sites(&self) -> Vec<SiteId> {
        self.inner.read().members.keys().copied().collect()
    }

    /// Number of registered members.
    pub fn member_count(&self) -> usize {
        self.inner.read().members.len()
    }

    /// Number of logged operations.
    pub fn operation_count(&self) -> usize {
        self.inner.read().log.len()
    }

    /// Current presence records.
    pub fn presence(&self) -> Vec<PresenceRecord> {
        self.inner.read().presence.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coedit_doc::Document;
    use coedit_protocol::Operation;

    fn room() -> Room {
        Room::new(Uuid::new_v4(), ServerConfig::default())
    }

    fn join(room: &Room, name: &str) -> JoinResponse {
        room.join(&JoinRequest::new(room.id(), Uuid::new_v4(), name), 0)
            .unwrap()
    }

    fn first_op(site: SiteId, text: &str) -> Operation {
        let mut doc = Document::new(site);
        doc.insert(0, text).unwrap()
    }

    #[test]
    fn join_assigns_monotonic_sites_and_colors() {
        let room = room();
        let a = join(&room, "ada");
        let b = join(&room, "bob");

        assert_eq!(a.site_id, 1);
        assert_eq!(b.site_id, 2);
        assert_ne!(a.color, b.color);
        assert_eq!(room.member_count(), 2);
    }

    #[test]
    fn sites_are_never_reassigned() {
        let room = room();
        let a = join(&room, "ada");
        let user = Uuid::new_v4();
        room.join(&JoinRequest::new(room.id(), user, "bob"), 0)
            .unwrap();

        room.leave(user);
        let c = join(&room, "bob");
        assert!(c.site_id > a.site_id + 1);
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let room = room();
        let mut request = JoinRequest::new(room.id(), Uuid::new_v4(), "old");
        request.protocol_version = 0;
        assert!(matches!(
            room.join(&request, 0),
            Err(ServerError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn update_fans_out_to_other_members() {
        let room = room();
        let a = join(&room, "ada");
        let b = join(&room, "bob");

        let recipients = room
            .apply_update(&Update {
                room_id: room.id(),
                site_id: a.site_id,
                operation: first_op(a.site_id, "hi"),
            })
            .unwrap();

        assert_eq!(recipients, vec![b.site_id]);
        assert_eq!(room.operation_count(), 1);
    }

    #[test]
    fn duplicate_update_is_absorbed() {
        let room = room();
        let a = join(&room, "ada");
        let update = Update {
            room_id: room.id(),
            site_id: a.site_id,
            operation: first_op(a.site_id, "x"),
        };

        room.apply_update(&update).unwrap();
        assert!(room.apply_update(&update).unwrap().is_empty());
        assert_eq!(room.operation_count(), 1);
    }

    #[test]
    fn unknown_site_is_rejected() {
        let room = room();
        join(&room, "ada");
        let result = room.apply_update(&Update {
            room_id: room.id(),
            site_id: 99,
            operation: first_op(99, "x"),
        });
        assert!(matches!(result, Err(ServerError::UnknownSite { .. })));
    }

    #[test]
    fn mismatched_op_site_is_rejected() {
        let room = room();
        let a = join(&room, "ada");
        let result = room.apply_update(&Update {
            room_id: room.id(),
            site_id: a.site_id,
            operation: first_op(a.site_id + 1, "x"),
        });
        assert!(matches!(result, Err(ServerError::InvalidRequest(_))));
    }

    #[test]
    fn out_of_order_update_is_rejected() {
        let room = room();
        let a = join(&room, "ada");
        let mut doc = Document::new(a.site_id);
        doc.insert(0, "a").unwrap();
        let second = doc.insert(1, "b").unwrap();

        let result = room.apply_update(&Update {
            room_id: room.id(),
            site_id: a.site_id,
            operation: second,
        });
        assert!(matches!(result, Err(ServerError::InvalidRequest(_))));
    }

    #[test]
    fn sync_diff_returns_the_gap_capped() {
        let capped = Room::new(
            Uuid::new_v4(),
            ServerConfig::default().with_max_sync_batch(2),
        );
        let a = capped
            .join(&JoinRequest::new(capped.id(), Uuid::new_v4(), "ada"), 0)
            .unwrap();

        let mut doc = Document::new(a.site_id);
        for i in 0..4 {
            let op = doc.insert(i, "x").unwrap();
            capped
                .apply_update(&Update {
                    room_id: capped.id(),
                    site_id: a.site_id,
                    operation: op,
                })
                .unwrap();
        }

        let response = capped.sync_diff(&SyncRequest {
            room_id: capped.id(),
            site_id: a.site_id,
            state_vector: coedit_protocol::StateVector::new(),
        });
        assert_eq!(response.operations.len(), 2);
        // The full vector still advertises everything.
        assert_eq!(response.state_vector.get(a.site_id), 4);
    }

    #[test]
    fn presence_is_stored_and_swept() {
        let quick = Room::new(
            Uuid::new_v4(),
            ServerConfig::default().with_presence_timeout(std::time::Duration::from_millis(100)),
        );
        let user = Uuid::new_v4();
        quick
            .join(&JoinRequest::new(quick.id(), user, "ada"), 0)
            .unwrap();

        quick.apply_presence(&Presence {
            room_id: quick.id(),
            record: PresenceRecord::new(user, "ada", "#e06c75", 1_000),
        });
        assert_eq!(quick.presence().len(), 1);

        assert_eq!(quick.sweep_presence(2_000), vec![user]);
        assert!(quick.presence().is_empty());
    }

    #[test]
    fn stale_presence_is_ignored() {
        let room = room();
        let user = Uuid::new_v4();
        room.apply_presence(&Presence {
            room_id: room.id(),
            record: PresenceRecord::new(user, "ada", "#e06c75", 2_000),
        });
        room.apply_presence(&Presence {
            room_id: room.id(),
            record: PresenceRecord::new(user, "ada", "#e06c75", 1_000),
        });

        assert_eq!(room.presence()[0].last_seen_ms, 2_000);
    }
}
