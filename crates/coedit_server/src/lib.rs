//! # coedit Server
//!
//! Room coordination and relay for coedit.
//!
//! This crate provides:
//! - `Room`: per-document site allocation, authoritative update log,
//!   presence table, and broadcast fan-out
//! - `RoomRegistry`: room lookup with get-or-create on join
//! - `RequestHandler`: validated, exhaustive dispatch of wire messages
//! - `CollabServer` / `Replica`: the server facade and explicit
//!   per-connection handles with broadcast mailboxes
//!
//! The server never interprets document content: operations that pass
//! boundary validation are logged and relayed as-is. Ordering between
//! sites, conflict resolution, and convergence are entirely client-side
//! concerns.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod handler;
mod registry;
mod room;
mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{Dispatch, RequestHandler};
pub use registry::RoomRegistry;
pub use room::{Member, Room};
pub use server::{CollabServer, Replica};
