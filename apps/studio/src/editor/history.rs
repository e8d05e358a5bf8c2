//! History Manager — bounded undo/redo over sanitized content snapshots.
//!
//! The cursor marks the current entry. A new record truncates everything after
//! the cursor (the redo branch) before appending, and the oldest entries are
//! evicted once the sequence exceeds `max_entries`.
//!
//! Recording is gated on an explicit state machine: while an undo/redo is being
//! applied to the live content the manager is `Applying`, and `record` is a
//! no-op until the owner calls `settle`.

use std::collections::VecDeque;

use serde::Serialize;
use tracing::debug;

use crate::editor::sanitizer;

pub const DEFAULT_MAX_ENTRIES: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub content: String,
    /// Unix milliseconds at capture time.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryState {
    Idle,
    Applying,
}

#[derive(Debug)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
    cursor: Option<usize>,
    max_entries: usize,
    state: HistoryState,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl History {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_entries.min(64)),
            cursor: None,
            max_entries: max_entries.max(1),
            state: HistoryState::Idle,
        }
    }

    /// Appends a sanitized snapshot. Returns false while undo/redo is applying.
    pub fn record(&mut self, content: &str, timestamp: i64) -> bool {
        if self.state == HistoryState::Applying {
            debug!("history record suppressed while applying undo/redo");
            return false;
        }

        match self.cursor {
            Some(cursor) => self.entries.truncate(cursor + 1),
            None => self.entries.clear(),
        }
        self.entries.push_back(HistoryEntry {
            content: sanitizer::clean(content),
            timestamp,
        });
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
        self.cursor = Some(self.entries.len() - 1);
        true
    }

    /// Steps back one entry and enters the `Applying` state.
    pub fn undo(&mut self) -> Option<&HistoryEntry> {
        let cursor = self.cursor.filter(|c| *c > 0)?;
        self.cursor = Some(cursor - 1);
        self.state = HistoryState::Applying;
        self.entries.get(cursor - 1)
    }

    /// Steps forward one entry and enters the `Applying` state.
    pub fn redo(&mut self) -> Option<&HistoryEntry> {
        let cursor = self.cursor.filter(|c| c + 1 < self.entries.len())?;
        self.cursor = Some(cursor + 1);
        self.state = HistoryState::Applying;
        self.entries.get(cursor + 1)
    }

    /// Marks the applied undo/redo as finished; recording resumes.
    pub fn settle(&mut self) {
        self.state = HistoryState::Idle;
    }

    /// Drops every entry and returns to `Idle`.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.cursor = None;
        self.state = HistoryState::Idle;
    }

    pub fn current(&self) -> Option<&HistoryEntry> {
        self.cursor.and_then(|cursor| self.entries.get(cursor))
    }

    /// Cursor position, or -1 when the history is empty.
    pub fn cursor(&self) -> isize {
        self.cursor.map_or(-1, |cursor| cursor as isize)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn state(&self) -> HistoryState {
        self.state
    }

    pub fn can_undo(&self) -> bool {
        self.cursor.is_some_and(|cursor| cursor > 0)
    }

    pub fn can_redo(&self) -> bool {
        self.cursor
            .is_some_and(|cursor| cursor + 1 < self.entries.len())
    }

    #[cfg(test)]
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(history: &History) -> Vec<String> {
        history.entries().map(|e| e.content.clone()).collect()
    }

    #[test]
    fn test_empty_history_cursor_is_minus_one() {
        let mut history = History::default();
        assert_eq!(history.cursor(), -1);
        assert!(history.undo().is_none());
        assert!(history.redo().is_none());
        assert_eq!(history.state(), HistoryState::Idle);
    }

    #[test]
    fn test_record_then_undo_restores_previous() {
        let mut history = History::default();
        history.record("<div>A</div>", 1);
        history.record("<div>AB</div>", 2);

        let restored = history.undo().map(|e| e.content.clone());
        assert_eq!(restored.as_deref(), Some("<div>A</div>"));
        assert_eq!(history.cursor(), 0);
    }

    #[test]
    fn test_record_sanitizes_content() {
        let mut history = History::default();
        history.record("<div>A<span></span></div><u></u>", 1);
        assert_eq!(history.current().unwrap().content, "<div>A</div>");
    }

    #[test]
    fn test_undo_at_start_is_noop() {
        let mut history = History::default();
        history.record("a", 1);
        assert!(history.undo().is_none());
        assert_eq!(history.cursor(), 0);
        assert_eq!(history.state(), HistoryState::Idle);
    }

    #[test]
    fn test_redo_bounded_at_last_index() {
        let mut history = History::default();
        history.record("a", 1);
        history.record("b", 2);
        assert!(history.redo().is_none());
        history.undo();
        history.settle();
        assert_eq!(history.redo().unwrap().content, "b");
        history.settle();
        assert!(history.redo().is_none());
        assert_eq!(history.cursor(), 1);
    }

    #[test]
    fn test_record_suppressed_while_applying() {
        let mut history = History::default();
        history.record("a", 1);
        history.record("b", 2);
        history.undo();
        assert_eq!(history.state(), HistoryState::Applying);

        assert!(!history.record("a", 3));
        assert_eq!(history.len(), 2);
        assert_eq!(history.cursor(), 0);

        history.settle();
        assert!(history.record("c", 4));
        assert_eq!(contents(&history), vec!["a", "c"]);
    }

    #[test]
    fn test_new_record_truncates_redo_branch() {
        let mut history = History::default();
        for (i, content) in ["a", "b", "c", "d"].iter().enumerate() {
            history.record(content, i as i64);
        }
        history.undo();
        history.undo();
        history.settle();
        history.record("x", 10);
        assert_eq!(contents(&history), vec!["a", "b", "x"]);
        assert!(!history.can_redo());
        assert_eq!(history.cursor(), 2);
    }

    #[test]
    fn test_eviction_keeps_latest_fifty() {
        let mut history = History::default();
        for i in 0..120 {
            history.record(&format!("v{i}"), i);
            assert!(history.len() <= DEFAULT_MAX_ENTRIES);
        }
        assert_eq!(history.len(), 50);
        assert_eq!(history.entries().next().unwrap().content, "v70");
        assert_eq!(history.current().unwrap().content, "v119");
        assert_eq!(history.cursor(), 49);
    }

    #[test]
    fn test_cursor_invariant_over_mixed_operations() {
        // Deterministic pseudo-random walk over record/undo/redo.
        let mut history = History::new(8);
        let mut seed: u64 = 0x9e37_79b9_7f4a_7c15;
        for step in 0..2_000i64 {
            seed = seed
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            match (seed >> 33) % 3 {
                0 => {
                    history.record(&format!("s{step}"), step);
                }
                1 => {
                    let before = history.current().map(|e| e.content.clone());
                    if history.undo().is_some() {
                        history.settle();
                        let redone = history.redo().map(|e| e.content.clone());
                        assert_eq!(redone, before, "redo must restore pre-undo content");
                        history.undo();
                    }
                    history.settle();
                }
                _ => {
                    history.redo();
                    history.settle();
                }
            }
            let cursor = history.cursor();
            assert!(cursor >= -1 && cursor <= history.len() as isize - 1);
            assert!(history.len() <= 8);
        }
    }
}
