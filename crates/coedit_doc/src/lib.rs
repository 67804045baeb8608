//! # coedit Document Store
//!
//! The replicated text document at the core of coedit.
//!
//! This crate provides:
//! - `Document`: tombstone-based replicated text with origin-anchored
//!   insertion ordering
//! - `IdAllocator`: per-site identifier and counter allocation
//! - `UpdateLog`: append-only operation log with state-vector diffing
//! - Causal buffering of out-of-order remote operations
//! - A merge-event channel for bridging to an editable buffer
//!
//! ## Convergence
//!
//! `Document::apply` is commutative and idempotent: any two replicas that
//! have applied the same set of operations — in any order, with any
//! duplicates — produce identical visible text. There is no central
//! sequencer and no rejected-edit path; local edits always apply
//! optimistically and concurrent insertions at the same position are ordered
//! by a deterministic identifier tie-break applied identically everywhere.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod document;
mod error;
mod events;
mod oplog;
mod segment;

pub use clock::IdAllocator;
pub use document::{ApplyOutcome, Document};
pub use error::{DocError, DocResult};
pub use events::DocEvent;
pub use oplog::UpdateLog;
