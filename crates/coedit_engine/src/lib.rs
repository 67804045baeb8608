//! # coedit Session Engine
//!
//! Client-side machinery for collaborative editing sessions.
//!
//! This crate provides:
//! - `Session`: the connection state machine (`Disconnected -> Connecting
//!   -> Syncing -> Live`) owning the local document replica
//! - `SessionTransport`: the pluggable transport seam, with a
//!   `MockTransport` for tests
//! - `Awareness`: debounced presence tracking with expiry
//! - `EditorAdapter`: buffer diffing and stable cursor anchoring
//! - `SessionConfig` / `RetryConfig`: builder-style configuration with
//!   exponential backoff
//!
//! ## Offline behavior
//!
//! Edits always apply to the local replica first. While disconnected they
//! accumulate in the update log; the next connect performs a two-way
//! state-vector exchange that pulls exactly the missed remote operations
//! and pushes exactly the queued local ones. No document state is ever
//! discarded on disconnect.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod awareness;
mod config;
mod editor;
mod error;
mod session;
mod transport;

pub use awareness::Awareness;
pub use config::{RetryConfig, SessionConfig};
pub use editor::EditorAdapter;
pub use error::{EngineError, EngineResult};
pub use session::{Session, SessionState, SessionStats};
pub use transport::{MockTransport, SessionTransport};
