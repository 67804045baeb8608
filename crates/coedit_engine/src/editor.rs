//! Bridges an editable text buffer to the replicated document.

use coedit_doc::{DocResult, Document};
use coedit_protocol::{CursorPos, OpId, Operation};

/// Adapter between a plain text buffer and a [`Document`].
///
/// The adapter owns a mirror of the visible text and the local caret. Buffer
/// changes are diffed against the mirror and turned into document
/// operations; remote merges re-render the mirror. The caret is tracked
/// against a stable [`OpId`] anchor (the character to its left), so remote
/// edits earlier in the text shift it naturally instead of displacing it.
#[derive(Debug)]
pub struct EditorAdapter {
    buffer: String,
    cursor: u64,
    /// Identifier of the character left of the caret; `None` at offset 0.
    anchor: Option<OpId>,
}

impl EditorAdapter {
    /// Creates an adapter mirroring the document's current text.
    pub fn new(doc: &Document) -> Self {
        Self {
            buffer: doc.to_text(),
            cursor: 0,
            anchor: None,
        }
    }

    /// The mirrored buffer contents.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// The caret as a visible character offset.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// The caret as a line/column pair, for presence broadcasts.
    pub fn cursor_pos(&self) -> CursorPos {
        let mut line = 0u32;
        let mut column = 0u32;
        for c in self.buffer.chars().take(self.cursor as usize) {
            if c == '\n' {
                line += 1;
                column = 0;
            } else {
                column += 1;
            }
        }
        CursorPos::new(line, column)
    }

    /// Places the caret, clamped to the buffer, and re-anchors it.
    pub fn set_cursor(&mut self, doc: &Document, offset: u64) {
        self.cursor = offset.min(doc.len());
        self.reanchor(doc);
    }

    /// Diffs `new_text` against the mirror and applies the minimal edit to
    /// the document: one deletion and/or one insertion at the first point
    /// of difference. Returns the produced operations for broadcast.
    pub fn apply_local_change(
        &mut self,
        doc: &mut Document,
        new_text: &str,
    ) -> DocResult<Vec<Operation>> {
        let old: Vec<char> = self.buffer.chars().collect();
        let new: Vec<char> = new_text.chars().collect();

        let mut prefix = 0;
        while prefix < old.len() && prefix < new.len() && old[prefix] == new[prefix] {
            prefix += 1;
        }
        let mut suffix = 0;
        while suffix < old.len() - prefix
            && suffix < new.len() - prefix
            && old[old.len() - 1 - suffix] == new[new.len() - 1 - suffix]
        {
            suffix += 1;
        }

        let deleted = old.len() - prefix - suffix;
        let inserted: String = new[prefix..new.len() - suffix].iter().collect();

        let mut ops = Vec::new();
        if deleted > 0 {
            ops.push(doc.delete(prefix as u64, deleted as u64)?);
        }
        if !inserted.is_empty() {
            ops.push(doc.insert(prefix as u64, &inserted)?);
        }

        self.buffer = new_text.to_string();
        self.cursor = (prefix + inserted.chars().count()) as u64;
        self.reanchor(doc);
        Ok(ops)
    }

    /// Re-renders the mirror after remote merges and restores the caret
    /// from its anchor.
    pub fn apply_remote(&mut self, doc: &Document) {
        self.buffer = doc.to_text();
        match self.anchor {
            None => self.cursor = 0,
            Some(id) => match doc.position_of(id) {
                Some(pos) => self.cursor = pos + 1,
                // Anchor character was deleted; keep the numeric offset,
                // clamped, and re-anchor from there.
                None => {
                    self.cursor = self.cursor.min(doc.len());
                    self.reanchor(doc);
                }
            },
        }
    }

    fn reanchor(&mut self, doc: &Document) {
        self.anchor = if self.cursor == 0 {
            None
        } else {
            doc.id_at(self.cursor - 1)
        };
    }
}
