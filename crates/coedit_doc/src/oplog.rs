//! Append-only update log with state-vector diffing.

use coedit_protocol::{Operation, StateVector};

/// The append-only log of applied operations.
///
/// The log records every operation a replica has applied — local and remote
/// — in application order, and maintains the replica's [`StateVector`]
/// alongside. It is only ever appended to, never mutated in place, so local
/// edits and remote merges need no coordination beyond the append itself.
///
/// Durable retention and snapshot compaction are deliberately out of scope;
/// the log is the extension point a persistent backing store would layer
/// onto.
#[derive(Debug, Clone, Default)]
pub struct UpdateLog {
    ops: Vec<Operation>,
    state: StateVector,
}

impl UpdateLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an applied operation and advances the state vector entry for
    /// its originating site.
    pub fn append(&mut self, op: Operation) {
        self.state.observe(op.site(), op.max_counter());
        self.ops.push(op);
    }

    /// Returns every logged operation not yet reflected in `remote` —
    /// exactly what a reconnecting or newly joined peer is missing,
    /// independent of when it joined.
    ///
    /// Operations from one site come back in causal (counter) order because
    /// that is the order they were applied and appended in.
    pub fn diff(&self, remote: &StateVector) -> Vec<Operation> {
        self.ops
            .iter()
            .filter(|op| !remote.covers(op))
            .cloned()
            .collect()
    }

    /// The replica's progress summary. O(distinct sites), not O(ops).
    pub fn state_vector(&self) -> &StateVector {
        &self.state
    }

    /// All logged operations in application order.
    pub fn operations(&self) -> &[Operation] {
        &self.ops
    }

    /// Number of logged operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if nothing has been logged.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
