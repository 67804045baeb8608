//! # coedit Protocol
//!
//! Wire protocol types and CBOR codecs for coedit.
//!
//! This crate provides:
//! - `OpId` / `OpSpan` operation identifiers
//! - Tagged `Operation` variants (insert / delete)
//! - `StateVector` per-site progress summaries
//! - `PresenceRecord` ephemeral awareness state
//! - `WireMessage` envelope with CBOR encoding/decoding
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod id;
mod messages;
mod operation;
mod presence;
mod state_vector;

pub use error::{ProtocolError, ProtocolResult};
pub use id::{OpId, OpSpan, SiteId};
pub use messages::{
    JoinRequest, JoinResponse, Leave, Presence, SyncRequest, SyncResponse, Update, WireMessage,
    PROTOCOL_VERSION,
};
pub use operation::{DeleteOp, InsertOp, Operation};
pub use presence::{CursorPos, PresenceRecord};
pub use state_vector::StateVector;
