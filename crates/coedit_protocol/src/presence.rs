//! Ephemeral presence records.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A cursor position in the shared buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPos {
    /// Zero-based line.
    pub line: u32,
    /// Zero-based column.
    pub column: u32,
}

impl CursorPos {
    /// Creates a cursor position.
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Ephemeral per-user awareness state.
///
/// Presence records are never persisted and never affect document
/// convergence. They are refreshed on every cursor move or heartbeat and
/// expire when `last_seen_ms` grows stale; no explicit leave message is
/// required for correctness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    /// Stable identity of the user (distinct from the site id).
    pub user_id: Uuid,
    /// Name shown next to the remote cursor.
    pub display_name: String,
    /// Display color assigned at join, as a CSS hex string.
    pub color: String,
    /// Current cursor, if the user has focus.
    pub cursor: Option<CursorPos>,
    /// Unix milliseconds of the last update from this user.
    pub last_seen_ms: u64,
}

impl PresenceRecord {
    /// Creates a fresh record with no cursor.
    pub fn new(
        user_id: Uuid,
        display_name: impl Into<String>,
        color: impl Into<String>,
        now_ms: u64,
    ) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            color: color.into(),
            cursor: None,
            last_seen_ms: now_ms,
        }
    }

    /// Returns true if the record is older than `timeout_ms` at `now_ms`.
    pub fn is_expired(&self, now_ms: u64, timeout_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_seen_ms) > timeout_ms
    }
}
