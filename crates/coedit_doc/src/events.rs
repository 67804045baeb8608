//! Merge events emitted for editor adapters.

/// A visible-text change produced by a *remote* merge.
///
/// Local edits do not emit events — the editor buffer already reflects them.
/// Positions are character offsets into the visible text at the moment the
/// merge applied, which is exactly what a buffer adapter needs to patch its
/// view and shift the local cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocEvent {
    /// Remote characters became visible at `pos`.
    RemoteInsert {
        /// Visible character offset of the insertion.
        pos: u64,
        /// Number of characters inserted.
        len: u64,
    },
    /// Visible characters at `pos` were tombstoned.
    RemoteDelete {
        /// Visible character offset of the deletion.
        pos: u64,
        /// Number of characters removed from view.
        len: u64,
    },
}
