//! Per-site identifier allocation.

use coedit_protocol::{OpId, SiteId};

/// Allocates operation identifiers for one site.
///
/// Counters are strictly increasing and site-local; paired with the site id
/// they form globally unique [`OpId`]s. An insertion of `n` characters
/// consumes `n` consecutive counters so every character is individually
/// addressable.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    site: SiteId,
    next: u64,
}

impl IdAllocator {
    /// Creates an allocator for `site` with counters starting at 1.
    pub fn new(site: SiteId) -> Self {
        Self { site, next: 1 }
    }

    /// The owning site.
    pub fn site(&self) -> SiteId {
        self.site
    }

    /// Allocates a span of `len` counters, returning the identifier of the
    /// first one.
    pub fn next_span(&mut self, len: u64) -> OpId {
        let id = OpId::new(self.site, self.next);
        self.next += len;
        id
    }

    /// Fast-forwards past `counter`, for seeding from persisted state.
    /// Never moves backwards.
    pub fn observe(&mut self, counter: u64) {
        if counter >= self.next {
            self.next = counter + 1;
        }
    }

    /// The counter the next allocation will use.
    pub fn next_counter(&self) -> u64 {
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_are_contiguous_and_disjoint() {
        let mut alloc = IdAllocator::new(7);
        let a = alloc.next_span(3);
        let b = alloc.next_span(1);
        let c = alloc.next_span(5);

        assert_eq!(a, OpId::new(7, 1));
        assert_eq!(b, OpId::new(7, 4));
        assert_eq!(c, OpId::new(7, 5));
        assert_eq!(alloc.next_counter(), 10);
    }

    #[test]
    fn observe_never_rewinds() {
        let mut alloc = IdAllocator::new(1);
        alloc.observe(10);
        assert_eq!(alloc.next_counter(), 11);
        alloc.observe(4);
        assert_eq!(alloc.next_counter(), 11);
        assert_eq!(alloc.next_span(1), OpId::new(1, 11));
    }
}
