//! The replicated document.

use crate::clock::IdAllocator;
use crate::error::{DocError, DocResult};
use crate::events::DocEvent;
use crate::oplog::UpdateLog;
use crate::segment::Segment;
use coedit_protocol::{DeleteOp, InsertOp, OpId, OpSpan, Operation, SiteId, StateVector};
use std::collections::HashSet;
use std::sync::mpsc::{channel, Receiver, Sender};

/// Result of applying a remote operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The operation was integrated into the document.
    Applied,
    /// The operation had already been applied; nothing changed.
    Duplicate,
    /// A dependency has not arrived yet; the operation is buffered and will
    /// be retried once the dependency applies.
    Deferred,
}

/// One replica's copy of the shared text.
///
/// The document holds every insertion ever merged, as run-length
/// [`Segment`]s in document order; deletions tombstone runs instead of
/// removing them so position references from other replicas stay valid.
/// Local edits apply synchronously and optimistically. Remote operations go
/// through [`Document::apply`], which is commutative and idempotent:
/// replicas that have applied the same operation set converge on identical
/// visible text regardless of delivery order or duplication.
///
/// Concurrent insertions into the same gap are ordered by an origin-bounded
/// scan: siblings that share a left origin are tie-broken by their
/// `(site, counter)` identifiers, lower first, identically on every replica.
pub struct Document {
    segments: Vec<Segment>,
    allocator: IdAllocator,
    log: UpdateLog,
    /// Causal buffer: remote operations whose dependencies have not arrived.
    pending: Vec<Operation>,
    subscribers: Vec<Sender<DocEvent>>,
}

impl Document {
    /// Creates an empty replica owned by `site`.
    pub fn new(site: SiteId) -> Self {
        Self {
            segments: Vec::new(),
            allocator: IdAllocator::new(site),
            log: UpdateLog::new(),
            pending: Vec::new(),
            subscribers: Vec::new(),
        }
    }

    /// The owning site.
    pub fn site(&self) -> SiteId {
        self.allocator.site()
    }

    /// Rebinds the replica to a freshly assigned site.
    ///
    /// A reconnecting session receives a new site id from the room; site
    /// ids are never reused, so minting future identifiers under the new
    /// site cannot collide with anything already in the document.
    pub fn rebind_site(&mut self, site: SiteId) {
        if site != self.allocator.site() {
            self.allocator = IdAllocator::new(site);
        }
    }

    /// Visible text length in characters.
    pub fn len(&self) -> u64 {
        self.segments.iter().map(|s| s.visible_len()).sum()
    }

    /// Returns true if no text is visible.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Renders the visible text by skipping tombstones.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for seg in &self.segments {
            if !seg.deleted {
                out.push_str(&seg.content);
            }
        }
        out
    }

    /// The replica's progress summary.
    pub fn state_vector(&self) -> &StateVector {
        self.log.state_vector()
    }

    /// The replica's update log.
    pub fn log(&self) -> &UpdateLog {
        &self.log
    }

    /// Operations this replica has that `remote` has not seen.
    pub fn diff(&self, remote: &StateVector) -> Vec<Operation> {
        self.log.diff(remote)
    }

    /// Number of operations waiting in the causal buffer.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Subscribes to remote merge events.
    ///
    /// The receiver sees one event per visible change produced by remote
    /// operations; local edits emit nothing. Dropped receivers are pruned on
    /// the next emit.
    pub fn subscribe(&mut self) -> Receiver<DocEvent> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }

    /// Inserts `text` at visible character position `pos`.
    ///
    /// Applies locally right away and returns the operation to broadcast.
    /// The origins are the characters adjacent to `pos` in this replica's
    /// current view and never change afterwards.
    pub fn insert(&mut self, pos: u64, text: &str) -> DocResult<Operation> {
        if text.is_empty() {
            return Err(DocError::EmptyEdit);
        }
        let len = self.len();
        if pos > len {
            return Err(DocError::PositionOutOfBounds { pos, len });
        }

        let origin_left = if pos == 0 { None } else { self.id_at(pos - 1) };
        let origin_right = self.id_at(pos);

        let char_len = text.chars().count() as u64;
        let id = self.allocator.next_span(char_len);
        let op = Operation::insert(id, origin_left, origin_right, text);

        if let Operation::Insert(ref ins) = op {
            self.integrate_insert(ins);
        }
        self.log.append(op.clone());
        Ok(op)
    }

    /// Tombstones `len` visible characters starting at `pos`.
    ///
    /// The covered runs are split as needed and marked deleted; nothing is
    /// physically removed. Returns the operation to broadcast.
    pub fn delete(&mut self, pos: u64, len: u64) -> DocResult<Operation> {
        if len == 0 {
            return Err(DocError::EmptyEdit);
        }
        let doc_len = self.len();
        if pos + len > doc_len {
            return Err(DocError::PositionOutOfBounds {
                pos: pos + len,
                len: doc_len,
            });
        }

        let mut remaining = len;
        let mut targets: Vec<OpSpan> = Vec::new();

        // Each round tombstones the run fragment now sitting at `pos`, so
        // the next visible character slides into the same position.
        while remaining > 0 {
            let (idx, offset) = match self.find_visible(pos) {
                Some(found) => found,
                None => break,
            };

            let mut piece_idx = idx;
            if offset > 0 {
                let right = self.segments[idx].split(offset);
                self.segments.insert(idx + 1, right);
                piece_idx = idx + 1;
            }

            let piece_len = self.segments[piece_idx].len;
            let take = remaining.min(piece_len);
            if take < piece_len {
                let right = self.segments[piece_idx].split(take);
                self.segments.insert(piece_idx + 1, right);
            }

            self.segments[piece_idx].deleted = true;
            targets.push(self.segments[piece_idx].span());
            remaining -= take;
        }

        let id = self.allocator.next_span(1);
        let op = Operation::delete(id, targets);
        self.log.append(op.clone());
        Ok(op)
    }

    /// Integrates a remote operation.
    ///
    /// Out-of-order operations are buffered until their dependencies arrive;
    /// duplicates are absorbed silently. After a successful apply the causal
    /// buffer is drained to a fixpoint, so a single call may unblock a whole
    /// chain of deferred operations.
    pub fn apply(&mut self, op: &Operation) -> ApplyOutcome {
        let outcome = self.apply_step(op);
        match outcome {
            ApplyOutcome::Deferred => self.pending.push(op.clone()),
            ApplyOutcome::Applied => self.drain_pending(),
            ApplyOutcome::Duplicate => {}
        }
        outcome
    }

    /// Applies a batch (e.g. a join snapshot or catch-up diff), returning
    /// how many operations were newly applied.
    pub fn apply_batch(&mut self, ops: &[Operation]) -> usize {
        ops.iter()
            .filter(|op| self.apply(op) == ApplyOutcome::Applied)
            .count()
    }

    /// Identifier of the visible character at `pos`.
    pub fn id_at(&self, pos: u64) -> Option<OpId> {
        let (idx, offset) = self.find_visible(pos)?;
        let seg = &self.segments[idx];
        Some(OpId::new(seg.site, seg.start + offset))
    }

    /// Visible position of the identified character, or `None` if it is
    /// tombstoned or unknown. This is what keeps a cursor anchored to a
    /// character rather than a drifting numeric offset.
    pub fn position_of(&self, id: OpId) -> Option<u64> {
        let mut visible = 0u64;
        for seg in &self.segments {
            if seg.contains(id) {
                if seg.deleted {
                    return None;
                }
                return Some(visible + (id.counter - seg.start));
            }
            visible += seg.visible_len();
        }
        None
    }

    fn apply_step(&mut self, op: &Operation) -> ApplyOutcome {
        if self.log.state_vector().covers(op) {
            return ApplyOutcome::Duplicate;
        }
        if !self.is_ready(op) {
            return ApplyOutcome::Deferred;
        }

        match op {
            Operation::Insert(ins) => {
                let pos = self.integrate_insert(ins);
                let len = ins.span().len;
                self.emit(DocEvent::RemoteInsert { pos, len });
            }
            Operation::Delete(del) => self.apply_delete(del),
        }
        self.log.append(op.clone());
        ApplyOutcome::Applied
    }

    /// Readiness rule: operations from one site apply in counter order, and
    /// an operation's references (origins for inserts, covered spans for
    /// deletes) must already be present.
    fn is_ready(&self, op: &Operation) -> bool {
        let sv = self.log.state_vector();
        if op.id().counter != sv.get(op.site()) + 1 {
            return false;
        }
        match op {
            Operation::Insert(ins) => {
                ins.origin_left.map_or(true, |id| sv.contains(id))
                    && ins.origin_right.map_or(true, |id| sv.contains(id))
            }
            Operation::Delete(del) => del.targets.iter().all(|span| sv.covers_span(span)),
        }
    }

    fn drain_pending(&mut self) {
        loop {
            let mut progressed = false;
            let waiting = std::mem::take(&mut self.pending);
            for op in waiting {
                match self.apply_step(&op) {
                    ApplyOutcome::Applied => progressed = true,
                    ApplyOutcome::Deferred => self.pending.push(op),
                    ApplyOutcome::Duplicate => {}
                }
            }
            if !progressed {
                break;
            }
        }
    }

    /// Places an insertion between its origins, returning the visible
    /// position it landed at.
    ///
    /// The scan walks the gap between the left and right origin. A sibling
    /// that shares the new run's left origin is tie-broken by identifier —
    /// lower `(site, counter)` stays first. A run whose origin lies outside
    /// the scanned window belongs to an enclosing earlier insertion, which
    /// terminates the scan. Applied identically on every replica, this is
    /// what makes concurrent insertions converge.
    fn integrate_insert(&mut self, op: &InsertOp) -> u64 {
        let seg = Segment::new(op.id, op.content.clone(), op.origin_left, op.origin_right);

        let start_idx = match op.origin_left {
            None => 0,
            Some(id) => match self.find_segment(id) {
                Some((idx, offset)) => {
                    if offset + 1 < self.segments[idx].len {
                        let right = self.segments[idx].split(offset + 1);
                        self.segments.insert(idx + 1, right);
                    }
                    idx + 1
                }
                None => 0,
            },
        };

        let end_idx = match op.origin_right {
            None => self.segments.len(),
            Some(id) => match self.find_segment(id) {
                Some((idx, offset)) => {
                    if offset > 0 {
                        let right = self.segments[idx].split(offset);
                        self.segments.insert(idx + 1, right);
                        idx + 1
                    } else {
                        idx
                    }
                }
                None => self.segments.len(),
            },
        };

        let mut dest = start_idx;
        let mut seen: HashSet<usize> = HashSet::new();
        let mut conflicting: HashSet<usize> = HashSet::new();

        for idx in start_idx..end_idx {
            let (o_site, o_start, o_left, o_right) = {
                let other = &self.segments[idx];
                (other.site, other.start, other.origin_left, other.origin_right)
            };
            seen.insert(idx);
            conflicting.insert(idx);

            if o_left == seg.origin_left {
                if (o_site, o_start) < (seg.site, seg.start) {
                    dest = idx + 1;
                    conflicting.clear();
                } else if o_right == seg.origin_right {
                    break;
                }
            } else {
                let origin_idx = o_left.and_then(|id| self.find_segment(id)).map(|(i, _)| i);
                match origin_idx {
                    Some(i) if seen.contains(&i) => {
                        if !conflicting.contains(&i) {
                            dest = idx + 1;
                            conflicting.clear();
                        }
                    }
                    // The other run hangs off something left of the window;
                    // the new run goes before it.
                    _ => break,
                }
            }
        }

        let visible_pos = self.visible_prefix(dest);
        self.segments.insert(dest, seg);
        visible_pos
    }

    fn apply_delete(&mut self, op: &DeleteOp) {
        for target in &op.targets {
            self.tombstone_span(target);
        }
    }

    /// Tombstones every not-yet-deleted character covered by `span`,
    /// splitting runs as needed. Already-deleted overlaps are skipped, which
    /// is what makes concurrent deletes of the same range idempotent.
    fn tombstone_span(&mut self, span: &OpSpan) {
        let span_end = span.start + span.len;
        let mut i = 0;

        while i < self.segments.len() {
            let (s_site, s_start, s_len, s_deleted) = {
                let seg = &self.segments[i];
                (seg.site, seg.start, seg.len, seg.deleted)
            };

            let disjoint =
                s_site != span.site || s_start >= span_end || s_start + s_len <= span.start;
            if disjoint || s_deleted {
                i += 1;
                continue;
            }

            let overlap_start = span.start.max(s_start);
            let overlap_end = span_end.min(s_start + s_len);
            let overlap_len = overlap_end - overlap_start;

            let mut piece_idx = i;
            if overlap_start > s_start {
                let right = self.segments[i].split(overlap_start - s_start);
                self.segments.insert(i + 1, right);
                piece_idx = i + 1;
            }
            if overlap_len < self.segments[piece_idx].len {
                let right = self.segments[piece_idx].split(overlap_len);
                self.segments.insert(piece_idx + 1, right);
            }

            let visible_pos = self.visible_prefix(piece_idx);
            self.segments[piece_idx].deleted = true;
            self.emit(DocEvent::RemoteDelete {
                pos: visible_pos,
                len: overlap_len,
            });

            i = piece_idx + 1;
        }
    }

    /// Locates the run containing the character `id`, with the character's
    /// offset inside the run. Tombstones are addressable.
    fn find_segment(&self, id: OpId) -> Option<(usize, u64)> {
        self.segments.iter().enumerate().find_map(|(i, seg)| {
            if seg.contains(id) {
                Some((i, id.counter - seg.start))
            } else {
                None
            }
        })
    }

    /// Locates the non-deleted run containing visible position `pos`.
    fn find_visible(&self, pos: u64) -> Option<(usize, u64)> {
        let mut acc = 0u64;
        for (i, seg) in self.segments.iter().enumerate() {
            let visible = seg.visible_len();
            if visible == 0 {
                continue;
            }
            if acc + visible > pos {
                return Some((i, pos - acc));
            }
            acc += visible;
        }
        None
    }

    /// Visible characters strictly before segment `idx`.
    fn visible_prefix(&self, idx: usize) -> u64 {
        self.segments[..idx].iter().map(|s| s.visible_len()).sum()
    }

    fn emit(&mut self, event: DocEvent) {
        self.subscribers.retain(|tx| tx.send(event).is_ok());
    }
}
