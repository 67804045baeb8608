//! Error types for the document store.

use thiserror::Error;

/// Result type for document operations.
pub type DocResult<T> = Result<T, DocError>;

/// Errors that can occur on local document mutations.
///
/// Remote merges have no error path: out-of-order operations are buffered,
/// duplicates are absorbed, and malformed operations are rejected at the
/// transport boundary before they reach the document.
#[derive(Error, Debug)]
pub enum DocError {
    /// A local edit addressed a position past the end of the visible text.
    #[error("position {pos} out of bounds (document length {len})")]
    PositionOutOfBounds {
        /// Requested visible position.
        pos: u64,
        /// Current visible length.
        len: u64,
    },

    /// A local edit that inserts or deletes nothing.
    #[error("empty edit")]
    EmptyEdit,
}
