//! Run-length segment nodes.

use coedit_protocol::{OpId, OpSpan, SiteId};

/// A contiguous run of characters inserted together.
///
/// Character `i` of the run owns counter `start + i`. The origins record
/// which characters were adjacent at insertion time; they never change, even
/// when neighbors are later deleted. Deleted runs become tombstones: their
/// content stops rendering but the node is retained so origin references
/// from other replicas stay resolvable.
#[derive(Debug, Clone)]
pub(crate) struct Segment {
    /// Originating site.
    pub site: SiteId,
    /// Counter of the first character.
    pub start: u64,
    /// Number of characters in the run.
    pub len: u64,
    /// Character to the left at insertion time.
    pub origin_left: Option<OpId>,
    /// Character to the right at insertion time.
    pub origin_right: Option<OpId>,
    /// Run content; always `len` characters.
    pub content: String,
    /// Tombstone flag. Never cleared once set.
    pub deleted: bool,
}

impl Segment {
    pub fn new(
        id: OpId,
        content: String,
        origin_left: Option<OpId>,
        origin_right: Option<OpId>,
    ) -> Self {
        let len = content.chars().count() as u64;
        Self {
            site: id.site,
            start: id.counter,
            len,
            origin_left,
            origin_right,
            content,
            deleted: false,
        }
    }

    /// Identifier of the first character.
    pub fn id(&self) -> OpId {
        OpId::new(self.site, self.start)
    }

    /// The counter span this run covers.
    pub fn span(&self) -> OpSpan {
        OpSpan::new(self.site, self.start, self.len)
    }

    /// Returns true if `id` addresses a character inside this run.
    pub fn contains(&self, id: OpId) -> bool {
        self.span().contains(id)
    }

    /// Rendered length: 0 for tombstones.
    pub fn visible_len(&self) -> u64 {
        if self.deleted {
            0
        } else {
            self.len
        }
    }

    /// Splits the run at character `offset`, returning the right part.
    ///
    /// After the split `self` covers `[0, offset)` and the returned segment
    /// covers `[offset, len)`. The right part's left origin becomes the last
    /// character of the left part; both keep the original right origin, an
    /// insertion-time property.
    pub fn split(&mut self, offset: u64) -> Segment {
        debug_assert!(offset > 0 && offset < self.len);

        let byte_offset = self
            .content
            .char_indices()
            .nth(offset as usize)
            .map(|(i, _)| i)
            .unwrap_or(self.content.len());
        let right_content = self.content.split_off(byte_offset);

        let right = Segment {
            site: self.site,
            start: self.start + offset,
            len: self.len - offset,
            origin_left: Some(OpId::new(self.site, self.start + offset - 1)),
            origin_right: self.origin_right,
            content: right_content,
            deleted: self.deleted,
        };

        self.len = offset;
        right
    }
}
