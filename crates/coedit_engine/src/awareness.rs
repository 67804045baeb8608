//! Awareness tracking: who is in the room and where their cursor is.

use coedit_protocol::{CursorPos, PresenceRecord};
use std::collections::HashMap;
use uuid::Uuid;

/// Tracks the local user's presence and every remote participant's.
///
/// Awareness is fully decoupled from the document: records are ephemeral,
/// loss or duplication of presence traffic never affects convergence, and
/// stale records expire on their own. Cursor-move broadcasts are debounced
/// so fast typing does not flood the room; heartbeats keep the record fresh
/// when the cursor is still.
#[derive(Debug)]
pub struct Awareness {
    local: PresenceRecord,
    peers: HashMap<Uuid, PresenceRecord>,
    debounce_ms: u64,
    timeout_ms: u64,
    last_broadcast_ms: Option<u64>,
}

impl Awareness {
    /// Creates an awareness tracker for the local user.
    pub fn new(
        user_id: Uuid,
        display_name: impl Into<String>,
        color: impl Into<String>,
        now_ms: u64,
        debounce_ms: u64,
        timeout_ms: u64,
    ) -> Self {
        Self {
            local: PresenceRecord::new(user_id, display_name, color, now_ms),
            peers: HashMap::new(),
            debounce_ms,
            timeout_ms,
            last_broadcast_ms: None,
        }
    }

    /// The local user's current record.
    pub fn local(&self) -> &PresenceRecord {
        &self.local
    }

    /// Remote participants currently tracked.
    pub fn peers(&self) -> impl Iterator<Item = &PresenceRecord> {
        self.peers.values()
    }

    /// Number of remote participants tracked.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Moves the local cursor. Local state updates immediately; a
    /// broadcastable record is returned at most once per debounce interval.
    pub fn set_local_cursor(&mut self, cursor: CursorPos, now_ms: u64) -> Option<PresenceRecord> {
        self.local.cursor = Some(cursor);
        self.local.last_seen_ms = now_ms;

        let due = match self.last_broadcast_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.debounce_ms,
        };
        if due {
            self.last_broadcast_ms = Some(now_ms);
            Some(self.local.clone())
        } else {
            None
        }
    }

    /// Refreshes the local record regardless of cursor movement. The
    /// returned record should be broadcast so peers do not expire us.
    pub fn heartbeat(&mut self, now_ms: u64) -> PresenceRecord {
        self.local.last_seen_ms = now_ms;
        self.last_broadcast_ms = Some(now_ms);
        self.local.clone()
    }

    /// Upserts a remote record. Records older than what is already held are
    /// ignored, as are echoes of the local user.
    pub fn on_remote_update(&mut self, record: PresenceRecord) -> bool {
        if record.user_id == self.local.user_id {
            return false;
        }
        if let Some(existing) = self.peers.get(&record.user_id) {
            if record.last_seen_ms < existing.last_seen_ms {
                return false;
            }
        }
        self.peers.insert(record.user_id, record);
        true
    }

    /// Removes a participant immediately (leave notice).
    pub fn remove(&mut self, user_id: Uuid) -> bool {
        self.peers.remove(&user_id).is_some()
    }

    /// Drops records past the timeout and returns the affected users.
    pub fn sweep_expired(&mut self, now_ms: u64) -> Vec<Uuid> {
        let timeout = self.timeout_ms;
        let expired: Vec<Uuid> = self
            .peers
            .values()
            .filter(|record| record.is_expired(now_ms, timeout))
            .map(|record| record.user_id)
            .collect();
        for user_id in &expired {
            self.peers.remove(user_id);
            tracing::debug!(%user_id, "presence expired");
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(now_ms: u64) -> Awareness {
        Awareness::new(Uuid::new_v4(), "ada", "#e06c75", now_ms, 200, 30_000)
    }

    fn remote(user_id: Uuid, last_seen_ms: u64) -> PresenceRecord {
        PresenceRecord::new(user_id, "bob", "#61afef", last_seen_ms)
    }

    #[test]
    fn cursor_broadcast_is_debounced() {
        let mut aw = tracker(0);

        // First move always broadcasts.
        assert!(aw.set_local_cursor(CursorPos::new(0, 1), 1_000).is_some());
        // Within the debounce window: state updates, no broadcast.
        assert!(aw.set_local_cursor(CursorPos::new(0, 2), 1_050).is_none());
        assert_eq!(aw.local().cursor, Some(CursorPos::new(0, 2)));
        // Past the window.
        assert!(aw.set_local_cursor(CursorPos::new(0, 3), 1_200).is_some());
    }

    #[test]
    fn heartbeat_always_refreshes() {
        let mut aw = tracker(0);
        let record = aw.heartbeat(5_000);
        assert_eq!(record.last_seen_ms, 5_000);
        assert_eq!(aw.heartbeat(6_000).last_seen_ms, 6_000);
    }

    #[test]
    fn stale_remote_updates_are_ignored() {
        let mut aw = tracker(0);
        let user = Uuid::new_v4();

        assert!(aw.on_remote_update(remote(user, 2_000)));
        assert!(!aw.on_remote_update(remote(user, 1_000)));
        assert!(aw.on_remote_update(remote(user, 3_000)));
        assert_eq!(aw.peer_count(), 1);
    }

    #[test]
    fn own_echo_is_ignored() {
        let mut aw = tracker(0);
        let echo = aw.local().clone();
        assert!(!aw.on_remote_update(echo));
        assert_eq!(aw.peer_count(), 0);
    }

    #[test]
    fn expired_records_are_swept() {
        let mut aw = tracker(0);
        let old = Uuid::new_v4();
        let fresh = Uuid::new_v4();

        aw.on_remote_update(remote(old, 1_000));
        aw.on_remote_update(remote(fresh, 40_000));

        let expired = aw.sweep_expired(50_000);
        assert_eq!(expired, vec![old]);
        assert_eq!(aw.peer_count(), 1);
    }

    #[test]
    fn leave_removes_immediately() {
        let mut aw = tracker(0);
        let user = Uuid::new_v4();
        aw.on_remote_update(remote(user, 1_000));

        assert!(aw.remove(user));
        assert!(!aw.remove(user));
        assert_eq!(aw.peer_count(), 0);
    }
}
