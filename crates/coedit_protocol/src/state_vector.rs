//! Per-site progress summaries.

use crate::id::{OpId, OpSpan, SiteId};
use crate::operation::Operation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A compact summary of which operations a replica has applied.
///
/// Maps each site to the highest counter applied from that site. Because
/// operations from one site are applied in counter order, a single number
/// per site fully describes a replica's progress — the summary is
/// O(distinct sites), not O(operations), and is cheap enough to exchange on
/// every reconnect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateVector {
    entries: BTreeMap<SiteId, u64>,
}

impl StateVector {
    /// Creates an empty state vector (nothing seen from anyone).
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest counter applied from `site` (0 if none).
    pub fn get(&self, site: SiteId) -> u64 {
        self.entries.get(&site).copied().unwrap_or(0)
    }

    /// Records that all counters up to `counter` have been applied for
    /// `site`. Never moves backwards.
    pub fn observe(&mut self, site: SiteId, counter: u64) {
        let entry = self.entries.entry(site).or_insert(0);
        if counter > *entry {
            *entry = counter;
        }
    }

    /// Returns true if the identified character/operation has been applied.
    pub fn contains(&self, id: OpId) -> bool {
        self.get(id.site) >= id.counter
    }

    /// Returns true if the whole span has been applied.
    pub fn covers_span(&self, span: &OpSpan) -> bool {
        self.get(span.site) >= span.start + span.len - 1
    }

    /// Returns true if every counter consumed by `op` has been applied.
    pub fn covers(&self, op: &Operation) -> bool {
        self.get(op.site()) >= op.max_counter()
    }

    /// Takes the per-site maximum of two vectors.
    pub fn merge(&mut self, other: &StateVector) {
        for (&site, &counter) in &other.entries {
            self.observe(site, counter);
        }
    }

    /// Iterates over `(site, highest counter)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (SiteId, u64)> + '_ {
        self.entries.iter().map(|(&s, &c)| (s, c))
    }

    /// Number of distinct sites seen.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been seen from any site.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observe_is_monotonic() {
        let mut sv = StateVector::new();
        sv.observe(1, 5);
        sv.observe(1, 3);
        assert_eq!(sv.get(1), 5);
        assert_eq!(sv.get(2), 0);
    }

    #[test]
    fn contains_and_covers() {
        let mut sv = StateVector::new();
        sv.observe(2, 4);

        assert!(sv.contains(OpId::new(2, 4)));
        assert!(!sv.contains(OpId::new(2, 5)));

        assert!(sv.covers_span(&OpSpan::new(2, 2, 3)));
        assert!(!sv.covers_span(&OpSpan::new(2, 3, 3)));

        let op = Operation::insert(OpId::new(2, 3), None, None, "ab");
        assert!(sv.covers(&op));
        let op = Operation::insert(OpId::new(2, 4), None, None, "ab");
        assert!(!sv.covers(&op));
    }

    #[test]
    fn merge_takes_maximum() {
        let mut a = StateVector::new();
        a.observe(1, 3);
        a.observe(2, 7);

        let mut b = StateVector::new();
        b.observe(1, 5);
        b.observe(3, 1);

        a.merge(&b);
        assert_eq!(a.get(1), 5);
        assert_eq!(a.get(2), 7);
        assert_eq!(a.get(3), 1);
        assert_eq!(a.len(), 3);
    }
}
