//! Operation identifiers.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Identifier of one participating replica.
///
/// Assigned once by the room coordinator when a session joins and never
/// reused, even after the session disconnects. A stale update from a
/// departed site therefore can never collide with a live one.
pub type SiteId = u64;

/// A globally unique operation identifier.
///
/// The pair `(site, counter)` identifies a single inserted character or a
/// single delete operation. Counters are site-local and start at 1; 0 means
/// "nothing seen" in a [`crate::StateVector`].
///
/// The total order is counter-first with the site id as tie-break. This
/// order is what every replica uses to resolve concurrent insertions at the
/// same position, so it must be identical everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpId {
    /// Originating site.
    pub site: SiteId,
    /// Site-local counter, starting at 1.
    pub counter: u64,
}

impl OpId {
    /// Creates a new operation identifier.
    pub fn new(site: SiteId, counter: u64) -> Self {
        Self { site, counter }
    }
}

impl PartialOrd for OpId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpId {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.counter.cmp(&other.counter) {
            Ordering::Equal => self.site.cmp(&other.site),
            order => order,
        }
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.site, self.counter)
    }
}

/// A contiguous run of counters from one site.
///
/// An insertion of `n` characters owns `n` consecutive counters; each
/// character is individually addressable so later edits can land inside the
/// run. Delete operations reference the spans they cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpSpan {
    /// Originating site.
    pub site: SiteId,
    /// First counter in the span.
    pub start: u64,
    /// Number of counters covered (always >= 1).
    pub len: u64,
}

impl OpSpan {
    /// Creates a new span.
    pub fn new(site: SiteId, start: u64, len: u64) -> Self {
        Self { site, start, len }
    }

    /// The identifier of the first character in the span.
    pub fn first(&self) -> OpId {
        OpId::new(self.site, self.start)
    }

    /// The identifier of the last character in the span.
    pub fn last(&self) -> OpId {
        OpId::new(self.site, self.start + self.len - 1)
    }

    /// Returns true if `id` falls inside this span.
    pub fn contains(&self, id: OpId) -> bool {
        id.site == self.site && id.counter >= self.start && id.counter < self.start + self.len
    }

    /// Returns true if the two spans overlap.
    pub fn overlaps(&self, other: &OpSpan) -> bool {
        self.site == other.site
            && self.start < other.start + other.len
            && other.start < self.start + self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_id_order_counter_first() {
        let a = OpId::new(7, 1);
        let b = OpId::new(2, 3);
        assert!(a < b);

        // Same counter: site breaks the tie.
        let c = OpId::new(1, 5);
        let d = OpId::new(4, 5);
        assert!(c < d);
    }

    #[test]
    fn span_contains() {
        let span = OpSpan::new(3, 10, 4);
        assert!(span.contains(OpId::new(3, 10)));
        assert!(span.contains(OpId::new(3, 13)));
        assert!(!span.contains(OpId::new(3, 14)));
        assert!(!span.contains(OpId::new(2, 11)));
        assert_eq!(span.first(), OpId::new(3, 10));
        assert_eq!(span.last(), OpId::new(3, 13));
    }

    #[test]
    fn span_overlap() {
        let a = OpSpan::new(1, 5, 5);
        assert!(a.overlaps(&OpSpan::new(1, 9, 2)));
        assert!(!a.overlaps(&OpSpan::new(1, 10, 2)));
        assert!(!a.overlaps(&OpSpan::new(2, 5, 5)));
    }
}
