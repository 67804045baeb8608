//! The collaborative session state machine.

use crate::awareness::Awareness;
use crate::config::SessionConfig;
use crate::editor::EditorAdapter;
use crate::error::{EngineError, EngineResult};
use crate::transport::SessionTransport;
use coedit_doc::{ApplyOutcome, DocEvent, Document};
use coedit_protocol::{
    JoinRequest, Leave, Operation, Presence, PresenceRecord, SiteId, StateVector, SyncRequest,
    Update, WireMessage,
};
use parking_lot::RwLock;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use uuid::Uuid;

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection; edits apply locally and queue in the update log.
    Disconnected,
    /// Join handshake in progress.
    Connecting,
    /// Exchanging state vectors to close the gap.
    Syncing,
    /// Fully caught up; edits broadcast as they happen.
    Live,
}

impl SessionState {
    /// Returns true if live traffic is flowing.
    pub fn is_live(&self) -> bool {
        matches!(self, SessionState::Live)
    }

    /// Returns true if a connect attempt may start.
    pub fn can_connect(&self) -> bool {
        matches!(self, SessionState::Disconnected)
    }
}

/// Counters describing session activity.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Operations broadcast to the room.
    pub ops_sent: u64,
    /// Remote operations merged into the document.
    pub ops_applied: u64,
    /// Remote operations ignored as duplicates.
    pub duplicates_ignored: u64,
    /// Remote operations buffered for missing dependencies.
    pub ops_deferred: u64,
    /// Completed connect cycles.
    pub sync_cycles: u64,
    /// Connect cycles after the first.
    pub reconnects: u64,
    /// Presence broadcasts sent.
    pub presence_sent: u64,
    /// Last error message, if any.
    pub last_error: Option<String>,
}

/// Replica-side state that exists once the first join has completed.
struct Active {
    doc: Document,
    adapter: EditorAdapter,
    awareness: Awareness,
}

/// A client session for one user in one room.
///
/// The session owns the local [`Document`] replica and drives the
/// `Disconnected -> Connecting -> Syncing -> Live` cycle. Edits are applied
/// locally first in every state; when the session is `Live` they are also
/// broadcast immediately, otherwise they sit in the update log and the next
/// state-vector exchange delivers them. Disconnects never discard document
/// state: reconnecting requests only the gap.
pub struct Session<T: SessionTransport> {
    config: SessionConfig,
    transport: Arc<T>,
    state: RwLock<SessionState>,
    active: RwLock<Option<Active>>,
    stats: RwLock<SessionStats>,
}

impl<T: SessionTransport> Session<T> {
    /// Creates a session. No traffic happens until [`Session::connect`].
    pub fn new(config: SessionConfig, transport: T) -> Self {
        Self {
            config,
            transport: Arc::new(transport),
            state: RwLock::new(SessionState::Disconnected),
            active: RwLock::new(None),
            stats: RwLock::new(SessionStats::default()),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// A snapshot of the session counters.
    pub fn stats(&self) -> SessionStats {
        self.stats.read().clone()
    }

    /// The site id assigned by the room, once joined.
    pub fn site_id(&self) -> Option<SiteId> {
        self.active.read().as_ref().map(|a| a.doc.site())
    }

    /// The visible document text. Empty before the first join.
    pub fn text(&self) -> String {
        self.active
            .read()
            .as_ref()
            .map(|a| a.doc.to_text())
            .unwrap_or_default()
    }

    /// The replica's state vector, once joined.
    pub fn state_vector(&self) -> Option<StateVector> {
        self.active
            .read()
            .as_ref()
            .map(|a| a.doc.state_vector().clone())
    }

    /// Remote participants currently tracked.
    pub fn peers(&self) -> Vec<PresenceRecord> {
        self.active
            .read()
            .as_ref()
            .map(|a| a.awareness.peers().cloned().collect())
            .unwrap_or_default()
    }

    /// Subscribes to remote merge events for UI rendering.
    pub fn subscribe(&self) -> EngineResult<Receiver<DocEvent>> {
        let mut guard = self.active.write();
        let active = guard.as_mut().ok_or(EngineError::NotConnected)?;
        Ok(active.doc.subscribe())
    }

    /// Connects to the room: join handshake, then state-vector exchange,
    /// then live.
    ///
    /// A first connect seeds the replica from the join snapshot. A
    /// reconnect keeps the existing replica, takes the freshly assigned
    /// site id, and pushes everything the server missed while offline.
    pub fn connect(&self) -> EngineResult<()> {
        if !self.state().can_connect() {
            return Err(EngineError::InvalidStateTransition {
                from: format!("{:?}", self.state()),
                to: "Connecting".into(),
            });
        }
        self.set_state(SessionState::Connecting);

        let request = JoinRequest {
            room_id: self.config.room_id,
            user_id: self.config.user_id,
            display_name: self.config.display_name.clone(),
            protocol_version: self.config.protocol_version,
        };
        let response = match self.transport.join(&request) {
            Ok(response) => response,
            Err(e) => {
                self.fail(&e);
                return Err(e);
            }
        };

        let reconnect = {
            let mut guard = self.active.write();
            match guard.as_mut() {
                None => {
                    let mut doc = Document::new(response.site_id);
                    doc.apply_batch(&response.snapshot);
                    let adapter = EditorAdapter::new(&doc);
                    let awareness = Awareness::new(
                        self.config.user_id,
                        self.config.display_name.clone(),
                        response.color.clone(),
                        0,
                        self.config.presence_debounce.as_millis() as u64,
                        self.config.presence_timeout.as_millis() as u64,
                    );
                    *guard = Some(Active {
                        doc,
                        adapter,
                        awareness,
                    });
                    false
                }
                Some(active) => {
                    active.doc.rebind_site(response.site_id);
                    true
                }
            }
        };
        tracing::debug!(site_id = response.site_id, reconnect, "joined room");

        self.set_state(SessionState::Syncing);
        if let Err(e) = self.exchange() {
            self.fail(&e);
            return Err(e);
        }

        self.set_state(SessionState::Live);
        let mut stats = self.stats.write();
        stats.sync_cycles += 1;
        if reconnect {
            stats.reconnects += 1;
        }
        stats.last_error = None;
        Ok(())
    }

    /// Connects with exponential backoff on retryable failures.
    pub fn connect_with_retry(&self) -> EngineResult<()> {
        let retry = self.config.retry.clone();
        let mut last_error = None;

        for attempt in 0..retry.max_attempts {
            if attempt > 0 {
                std::thread::sleep(retry.delay_for_attempt(attempt));
            }
            match self.connect() {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt + 1 < retry.max_attempts => {
                    tracing::debug!(attempt, error = %e, "connect failed; retrying");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or(EngineError::NotConnected))
    }

    /// Leaves the room and closes the transport. Document state is kept.
    pub fn disconnect(&self) -> EngineResult<()> {
        if self.state().is_live() {
            let leave = Leave {
                room_id: self.config.room_id,
                user_id: self.config.user_id,
            };
            if let Err(e) = self.transport.send_leave(&leave) {
                tracing::debug!(error = %e, "leave notice failed");
            }
        }
        self.transport.close()?;
        self.set_state(SessionState::Disconnected);
        Ok(())
    }

    /// Inserts text at a visible position and broadcasts the operation.
    pub fn insert(&self, pos: u64, text: &str) -> EngineResult<()> {
        let op = {
            let mut guard = self.active.write();
            let active = guard.as_mut().ok_or(EngineError::NotConnected)?;
            let op = active.doc.insert(pos, text)?;
            active.adapter.apply_remote(&active.doc);
            op
        };
        self.broadcast(op);
        Ok(())
    }

    /// Deletes visible characters and broadcasts the operation.
    pub fn delete(&self, pos: u64, len: u64) -> EngineResult<()> {
        let op = {
            let mut guard = self.active.write();
            let active = guard.as_mut().ok_or(EngineError::NotConnected)?;
            let op = active.doc.delete(pos, len)?;
            active.adapter.apply_remote(&active.doc);
            op
        };
        self.broadcast(op);
        Ok(())
    }

    /// Replaces the mirrored buffer with `new_text`, deriving the minimal
    /// operations and broadcasting them.
    pub fn apply_buffer_change(&self, new_text: &str) -> EngineResult<()> {
        let ops = {
            let mut guard = self.active.write();
            let active = guard.as_mut().ok_or(EngineError::NotConnected)?;
            let Active { doc, adapter, .. } = active;
            adapter.apply_local_change(doc, new_text)?
        };
        for op in ops {
            self.broadcast(op);
        }
        Ok(())
    }

    /// The mirrored editor buffer.
    pub fn buffer(&self) -> String {
        self.active
            .read()
            .as_ref()
            .map(|a| a.adapter.buffer().to_string())
            .unwrap_or_default()
    }

    /// The local caret as a visible character offset.
    pub fn cursor(&self) -> u64 {
        self.active.read().as_ref().map(|a| a.adapter.cursor()).unwrap_or(0)
    }

    /// Moves the local caret and broadcasts presence, debounced.
    pub fn set_cursor(&self, offset: u64, now_ms: u64) -> EngineResult<()> {
        let update = {
            let mut guard = self.active.write();
            let active = guard.as_mut().ok_or(EngineError::NotConnected)?;
            active.adapter.set_cursor(&active.doc, offset);
            let pos = active.adapter.cursor_pos();
            active.awareness.set_local_cursor(pos, now_ms)
        };
        if let Some(record) = update {
            self.send_presence(record);
        }
        Ok(())
    }

    /// Refreshes presence so peers do not expire this user.
    pub fn heartbeat(&self, now_ms: u64) -> EngineResult<()> {
        let record = {
            let mut guard = self.active.write();
            let active = guard.as_mut().ok_or(EngineError::NotConnected)?;
            active.awareness.heartbeat(now_ms)
        };
        self.send_presence(record);
        Ok(())
    }

    /// Drops remote presence records past the timeout.
    pub fn sweep_presence(&self, now_ms: u64) -> Vec<Uuid> {
        self.active
            .write()
            .as_mut()
            .map(|a| a.awareness.sweep_expired(now_ms))
            .unwrap_or_default()
    }

    /// Drains and dispatches incoming broadcasts. Returns the number of
    /// messages handled.
    pub fn poll(&self) -> EngineResult<usize> {
        if self.state().can_connect() {
            return Err(EngineError::NotConnected);
        }
        let messages = match self.transport.poll_incoming() {
            Ok(messages) => messages,
            Err(e) => {
                self.fail(&e);
                return Err(e);
            }
        };

        let mut guard = self.active.write();
        let active = guard.as_mut().ok_or(EngineError::NotConnected)?;
        let mut handled = 0;
        for message in messages {
            match message {
                WireMessage::Update(update) => {
                    self.record_outcome(active.doc.apply(&update.operation));
                    active.adapter.apply_remote(&active.doc);
                }
                WireMessage::SyncResponse(response) => {
                    for op in &response.operations {
                        self.record_outcome(active.doc.apply(op));
                    }
                    active.adapter.apply_remote(&active.doc);
                }
                WireMessage::Presence(presence) => {
                    active.awareness.on_remote_update(presence.record);
                }
                WireMessage::Leave(leave) => {
                    active.awareness.remove(leave.user_id);
                }
                other => {
                    tracing::warn!(type_code = other.type_code(), "unexpected broadcast");
                }
            }
            handled += 1;
        }
        Ok(handled)
    }

    fn set_state(&self, state: SessionState) {
        tracing::debug!(?state, "session state");
        *self.state.write() = state;
    }

    fn fail(&self, error: &EngineError) {
        self.set_state(SessionState::Disconnected);
        self.stats.write().last_error = Some(error.to_string());
    }

    fn record_outcome(&self, outcome: ApplyOutcome) {
        let mut stats = self.stats.write();
        match outcome {
            ApplyOutcome::Applied => stats.ops_applied += 1,
            ApplyOutcome::Duplicate => stats.duplicates_ignored += 1,
            ApplyOutcome::Deferred => stats.ops_deferred += 1,
        }
    }

    /// Two-way state-vector exchange: pull the gap, then push ours.
    ///
    /// The server may cap a sync response, so pulling loops until the local
    /// vector covers the server's. Each round must advance the log or the
    /// exchange is aborted.
    fn exchange(&self) -> EngineResult<()> {
        let missing = loop {
            let request = {
                let guard = self.active.read();
                let active = guard.as_ref().ok_or(EngineError::NotConnected)?;
                SyncRequest {
                    room_id: self.config.room_id,
                    site_id: active.doc.site(),
                    state_vector: active.doc.state_vector().clone(),
                }
            };
            let response = self.transport.sync(&request)?;

            let mut guard = self.active.write();
            let active = guard.as_mut().ok_or(EngineError::NotConnected)?;
            let before = active.doc.log().len();
            for op in &response.operations {
                self.record_outcome(active.doc.apply(op));
            }
            active.adapter.apply_remote(&active.doc);

            let caught_up = response
                .state_vector
                .iter()
                .all(|(site, counter)| active.doc.state_vector().get(site) >= counter);
            if caught_up {
                break active.doc.diff(&response.state_vector);
            }
            if active.doc.log().len() == before {
                return Err(EngineError::Rejected("sync made no progress".into()));
            }
        };

        // Queued operations may predate a reconnect, so each update is
        // stamped with the site that minted it, not the current one.
        for operation in missing {
            self.transport.send_update(&Update {
                room_id: self.config.room_id,
                site_id: operation.site(),
                operation,
            })?;
            self.stats.write().ops_sent += 1;
        }
        Ok(())
    }

    /// Broadcasts an operation if live; otherwise it waits in the log for
    /// the next exchange.
    fn broadcast(&self, operation: Operation) {
        if !self.state().is_live() {
            return;
        }
        let update = Update {
            room_id: self.config.room_id,
            site_id: operation.site(),
            operation,
        };
        match self.transport.send_update(&update) {
            Ok(()) => self.stats.write().ops_sent += 1,
            Err(e) => {
                tracing::warn!(error = %e, "update send failed; going offline");
                self.fail(&e);
            }
        }
    }

    fn send_presence(&self, record: PresenceRecord) {
        if !self.state().is_live() {
            return;
        }
        let presence = Presence {
            room_id: self.config.room_id,
            record,
        };
        match self.transport.send_presence(&presence) {
            Ok(()) => self.stats.write().presence_sent += 1,
            Err(e) => {
                tracing::warn!(error = %e, "presence send failed; going offline");
                self.fail(&e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use coedit_protocol::{JoinResponse, SyncResponse};

    fn scripted_transport(site_id: SiteId, snapshot: Vec<Operation>) -> MockTransport {
        let transport = MockTransport::new();
        let mut sv = StateVector::new();
        for op in &snapshot {
            sv.observe(op.site(), op.max_counter());
        }
        transport.set_join_response(JoinResponse {
            site_id,
            color: "#61afef".into(),
            snapshot,
            state_vector: sv.clone(),
        });
        transport.set_sync_response(SyncResponse {
            operations: vec![],
            state_vector: sv,
        });
        transport
    }

    fn config() -> SessionConfig {
        SessionConfig::new(Uuid::new_v4(), Uuid::new_v4(), "grace")
    }

    /// Produces room history as seen from another participant.
    fn history(text: &str) -> Vec<Operation> {
        let mut doc = Document::new(1);
        doc.insert(0, text).unwrap();
        doc.log().operations().to_vec()
    }

    #[test]
    fn starts_disconnected() {
        let session = Session::new(config(), MockTransport::new());
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(matches!(
            session.insert(0, "x"),
            Err(EngineError::NotConnected)
        ));
    }

    #[test]
    fn connect_seeds_replica_from_snapshot() {
        let session = Session::new(config(), scripted_transport(2, history("hello")));
        session.connect().unwrap();

        assert_eq!(session.state(), SessionState::Live);
        assert_eq!(session.site_id(), Some(2));
        assert_eq!(session.text(), "hello");
        assert_eq!(session.stats().sync_cycles, 1);
    }

    #[test]
    fn live_edits_broadcast() {
        let session = Session::new(config(), scripted_transport(2, vec![]));
        session.connect().unwrap();

        session.insert(0, "hi").unwrap();
        assert_eq!(session.transport.sent_updates().len(), 1);
        assert_eq!(session.stats().ops_sent, 1);
        assert_eq!(session.text(), "hi");
    }

    #[test]
    fn buffer_change_broadcasts_minimal_ops() {
        let session = Session::new(config(), scripted_transport(2, vec![]));
        session.connect().unwrap();

        session.apply_buffer_change("hello world").unwrap();
        session.apply_buffer_change("hello rust").unwrap();

        assert_eq!(session.buffer(), "hello rust");
        // One insert, then a delete + insert pair.
        assert_eq!(session.transport.sent_updates().len(), 3);
    }

    #[test]
    fn poll_merges_remote_updates() {
        let cfg = config();
        let transport = scripted_transport(2, vec![]);
        let remote = {
            let mut doc = Document::new(5);
            doc.insert(0, "abc").unwrap()
        };
        transport.push_incoming(WireMessage::Update(Update {
            room_id: cfg.room_id,
            site_id: 5,
            operation: remote,
        }));

        let session = Session::new(cfg, transport);
        session.connect().unwrap();

        assert_eq!(session.poll().unwrap(), 1);
        assert_eq!(session.text(), "abc");
        assert_eq!(session.stats().ops_applied, 1);
    }

    #[test]
    fn duplicate_updates_are_counted_not_applied() {
        let cfg = config();
        let transport = scripted_transport(2, vec![]);
        let op = {
            let mut doc = Document::new(5);
            doc.insert(0, "x").unwrap()
        };
        for _ in 0..2 {
            transport.push_incoming(WireMessage::Update(Update {
                room_id: cfg.room_id,
                site_id: 5,
                operation: op.clone(),
            }));
        }

        let session = Session::new(cfg, transport);
        session.connect().unwrap();
        session.poll().unwrap();

        assert_eq!(session.text(), "x");
        assert_eq!(session.stats().ops_applied, 1);
        assert_eq!(session.stats().duplicates_ignored, 1);
    }

    #[test]
    fn presence_flows_through_poll() {
        let cfg = config();
        let transport = scripted_transport(2, vec![]);
        transport.push_incoming(WireMessage::Presence(Presence {
            room_id: cfg.room_id,
            record: PresenceRecord::new(Uuid::new_v4(), "bob", "#98c379", 1_000),
        }));

        let session = Session::new(cfg, transport);
        session.connect().unwrap();
        session.poll().unwrap();
        assert_eq!(session.peers().len(), 1);

        // Expiry sweep removes it again.
        assert_eq!(session.sweep_presence(120_000).len(), 1);
        assert!(session.peers().is_empty());
    }

    #[test]
    fn cursor_moves_send_presence() {
        let session = Session::new(config(), scripted_transport(2, vec![]));
        session.connect().unwrap();
        session.insert(0, "hello").unwrap();

        session.set_cursor(3, 1_000).unwrap();
        assert_eq!(session.transport.sent_presence().len(), 1);
        // Within the debounce window nothing goes out.
        session.set_cursor(4, 1_050).unwrap();
        assert_eq!(session.transport.sent_presence().len(), 1);
    }

    #[test]
    fn offline_edits_flush_on_reconnect() {
        let session = Session::new(config(), scripted_transport(2, vec![]));
        session.connect().unwrap();
        session.disconnect().unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);

        // Offline edit: applies locally, nothing sent.
        session.transport.set_connected(true);
        session.insert(0, "offline").unwrap();
        assert!(session.transport.sent_updates().is_empty());

        // Reconnect assigns a fresh site; the exchange pushes the gap.
        session.transport.set_join_response(JoinResponse {
            site_id: 9,
            color: "#61afef".into(),
            snapshot: vec![],
            state_vector: StateVector::new(),
        });
        session.connect().unwrap();

        assert_eq!(session.site_id(), Some(9));
        assert_eq!(session.stats().reconnects, 1);
        assert_eq!(session.transport.sent_updates().len(), 1);
        assert_eq!(session.text(), "offline");
    }

    #[test]
    fn send_failure_degrades_to_disconnected() {
        let session = Session::new(config(), scripted_transport(2, vec![]));
        session.connect().unwrap();

        session.transport.set_connected(false);
        session.insert(0, "kept").unwrap();

        assert_eq!(session.state(), SessionState::Disconnected);
        // The edit survives locally for the next exchange.
        assert_eq!(session.text(), "kept");
        assert!(session.stats().last_error.is_some());
    }

    #[test]
    fn connect_twice_is_invalid() {
        let session = Session::new(config(), scripted_transport(2, vec![]));
        session.connect().unwrap();
        assert!(matches!(
            session.connect(),
            Err(EngineError::InvalidStateTransition { .. })
        ));
    }
}
