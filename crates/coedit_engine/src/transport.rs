//! Transport abstraction for session traffic.

use crate::error::{EngineError, EngineResult};
use coedit_protocol::{
    JoinRequest, JoinResponse, Leave, Presence, SyncRequest, SyncResponse, Update, WireMessage,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

/// A session transport carries protocol messages to and from the server.
///
/// Requests (`join`, `sync`) are round trips; updates and presence are
/// fire-and-forget sends; broadcasts from other participants arrive through
/// `poll_incoming`. Implementations may be WebSocket, HTTP long-poll, or
/// an in-process loopback for tests.
pub trait SessionTransport: Send + Sync {
    /// Performs the join handshake.
    fn join(&self, request: &JoinRequest) -> EngineResult<JoinResponse>;

    /// Exchanges state vectors and fetches missing operations.
    fn sync(&self, request: &SyncRequest) -> EngineResult<SyncResponse>;

    /// Sends a single operation broadcast.
    fn send_update(&self, update: &Update) -> EngineResult<()>;

    /// Sends a presence broadcast.
    fn send_presence(&self, presence: &Presence) -> EngineResult<()>;

    /// Sends a leave notice.
    fn send_leave(&self, leave: &Leave) -> EngineResult<()>;

    /// Drains broadcasts queued for this session.
    fn poll_incoming(&self) -> EngineResult<Vec<WireMessage>>;

    /// Checks if the transport is connected.
    fn is_connected(&self) -> bool;

    /// Closes the transport connection.
    fn close(&self) -> EngineResult<()>;
}

/// A mock transport for unit tests: scripted responses, captured sends.
#[derive(Debug, Default)]
pub struct MockTransport {
    connected: AtomicBool,
    join_response: Mutex<Option<JoinResponse>>,
    sync_response: Mutex<Option<SyncResponse>>,
    sent_updates: Mutex<Vec<Update>>,
    sent_presence: Mutex<Vec<Presence>>,
    sent_leaves: Mutex<Vec<Leave>>,
    incoming: Mutex<VecDeque<WireMessage>>,
}

impl MockTransport {
    /// Creates a connected mock transport.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            ..Default::default()
        }
    }

    /// Scripts the join response.
    pub fn set_join_response(&self, response: JoinResponse) {
        *self.join_response.lock() = Some(response);
    }

    /// Scripts the sync response.
    pub fn set_sync_response(&self, response: SyncResponse) {
        *self.sync_response.lock() = Some(response);
    }

    /// Queues a broadcast for the next `poll_incoming`.
    pub fn push_incoming(&self, message: WireMessage) {
        self.incoming.lock().push_back(message);
    }

    /// All updates sent through this transport.
    pub fn sent_updates(&self) -> Vec<Update> {
        self.sent_updates.lock().clone()
    }

    /// All presence broadcasts sent through this transport.
    pub fn sent_presence(&self) -> Vec<Presence> {
        self.sent_presence.lock().clone()
    }

    /// All leave notices sent through this transport.
    pub fn sent_leaves(&self) -> Vec<Leave> {
        self.sent_leaves.lock().clone()
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    fn check_connected(&self) -> EngineResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(EngineError::NotConnected)
        }
    }
}

impl SessionTransport for MockTransport {
    fn join(&self, _request: &JoinRequest) -> EngineResult<JoinResponse> {
        self.check_connected()?;
        self.join_response
            .lock()
            .clone()
            .ok_or_else(|| EngineError::Rejected("no scripted join response".into()))
    }

    fn sync(&self, _request: &SyncRequest) -> EngineResult<SyncResponse> {
        self.check_connected()?;
        self.sync_response
            .lock()
            .clone()
            .ok_or_else(|| EngineError::Rejected("no scripted sync response".into()))
    }

    fn send_update(&self, update: &Update) -> EngineResult<()> {
        self.check_connected()?;
        self.sent_updates.lock().push(update.clone());
        Ok(())
    }

    fn send_presence(&self, presence: &Presence) -> EngineResult<()> {
        self.check_connected()?;
        self.sent_presence.lock().push(presence.clone());
        Ok(())
    }

    fn send_leave(&self, leave: &Leave) -> EngineResult<()> {
        self.check_connected()?;
        self.sent_leaves.lock().push(leave.clone());
        Ok(())
    }

    fn poll_incoming(&self) -> EngineResult<Vec<WireMessage>> {
        self.check_connected()?;
        Ok(self.incoming.lock().drain(..).collect())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&self) -> EngineResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}
