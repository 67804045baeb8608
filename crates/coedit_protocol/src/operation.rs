//! Replicated document operations.

use crate::error::{ProtocolError, ProtocolResult};
use crate::id::{OpId, OpSpan, SiteId};
use serde::{Deserialize, Serialize};

/// An insertion of a run of characters.
///
/// `id` addresses the first character; a run of `n` characters owns the
/// counters `id.counter .. id.counter + n`. The origins record which
/// characters were adjacent *at insertion time* in the originating replica's
/// view. They are immutable, even if those neighbors are later deleted —
/// tombstones keep them resolvable on every replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertOp {
    /// Identifier of the first inserted character.
    pub id: OpId,
    /// Character to the left at insertion time; `None` at document start.
    pub origin_left: Option<OpId>,
    /// Character to the right at insertion time; `None` at document end.
    pub origin_right: Option<OpId>,
    /// The inserted text.
    pub content: String,
}

impl InsertOp {
    /// The counter span covered by this insertion (one counter per char).
    pub fn span(&self) -> OpSpan {
        OpSpan::new(self.id.site, self.id.counter, self.content.chars().count() as u64)
    }
}

/// A tombstone operation covering one or more character spans.
///
/// The delete has its own identifier (one counter) so state-vector diffs
/// account for deletions exactly like insertions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOp {
    /// Identifier of the delete operation itself.
    pub id: OpId,
    /// Character spans to tombstone.
    pub targets: Vec<OpSpan>,
}

/// A replicated document operation.
///
/// The transport layer matches on the variant exhaustively; there are no
/// untyped payloads anywhere in the protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Insert a run of characters.
    Insert(InsertOp),
    /// Tombstone previously inserted characters.
    Delete(DeleteOp),
}

impl Operation {
    /// Creates an insert operation.
    pub fn insert(
        id: OpId,
        origin_left: Option<OpId>,
        origin_right: Option<OpId>,
        content: impl Into<String>,
    ) -> Self {
        Self::Insert(InsertOp {
            id,
            origin_left,
            origin_right,
            content: content.into(),
        })
    }

    /// Creates a delete operation.
    pub fn delete(id: OpId, targets: Vec<OpSpan>) -> Self {
        Self::Delete(DeleteOp { id, targets })
    }

    /// The operation's identifier (first counter for inserts).
    pub fn id(&self) -> OpId {
        match self {
            Operation::Insert(op) => op.id,
            Operation::Delete(op) => op.id,
        }
    }

    /// The originating site.
    pub fn site(&self) -> SiteId {
        self.id().site
    }

    /// The highest counter this operation consumes at its site.
    pub fn max_counter(&self) -> u64 {
        match self {
            Operation::Insert(op) => op.span().last().counter,
            Operation::Delete(op) => op.id.counter,
        }
    }

    /// Validates structural protocol rules before the operation may be
    /// applied: non-zero counters and, for inserts, non-empty content.
    pub fn validate(&self) -> ProtocolResult<()> {
        if self.id().counter == 0 {
            return Err(ProtocolError::invalid("operation counter must be >= 1"));
        }
        match self {
            Operation::Insert(op) => {
                if op.content.is_empty() {
                    return Err(ProtocolError::invalid("empty insert"));
                }
            }
            Operation::Delete(op) => {
                if op.targets.is_empty() {
                    return Err(ProtocolError::invalid("delete with no targets"));
                }
                if op.targets.iter().any(|s| s.len == 0 || s.start == 0) {
                    return Err(ProtocolError::invalid("zero-length delete target"));
                }
            }
        }
        Ok(())
    }
}
