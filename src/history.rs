//! Linear undo/redo history of drawing-layer snapshots

use tracing::debug;

/// Ordered snapshots with a cursor
///
/// The cursor is `None` only while the history is empty. Recording after an
/// undo discards every entry past the cursor, so the history never branches.
#[derive(Debug, Clone)]
pub struct EditHistory<S> {
    entries: Vec<S>,
    cursor: Option<usize>,
}

impl<S> Default for EditHistory<S> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            cursor: None,
        }
    }
}

impl<S> EditHistory<S> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a snapshot, discarding any redo entries
    pub fn record(&mut self, snapshot: S) {
        let keep = self.cursor.map_or(0, |cursor| cursor + 1);
        if keep < self.entries.len() {
            debug!(dropped = self.entries.len() - keep, "Discarding redo entries");
            self.entries.truncate(keep);
        }
        self.entries.push(snapshot);
        self.cursor = Some(self.entries.len() - 1);
    }

    /// Step back; returns the snapshot to restore, or `None` at the start
    pub fn undo(&mut self) -> Option<&S> {
        let cursor = self.cursor?;
        if cursor == 0 {
            return None;
        }
        self.cursor = Some(cursor - 1);
        self.entries.get(cursor - 1)
    }

    /// Step forward; returns the snapshot to restore, or `None` at the end
    pub fn redo(&mut self) -> Option<&S> {
        let next = self.cursor? + 1;
        if next >= self.entries.len() {
            return None;
        }
        self.cursor = Some(next);
        self.entries.get(next)
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.cursor.is_some_and(|cursor| cursor > 0)
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.cursor
            .is_some_and(|cursor| cursor + 1 < self.entries.len())
    }

    /// Snapshot at the cursor
    #[must_use]
    pub fn current(&self) -> Option<&S> {
        self.cursor.and_then(|cursor| self.entries.get(cursor))
    }

    #[must_use]
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = None;
    }
}
