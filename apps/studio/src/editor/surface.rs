//! Editable Surface — the content region that takes edits, keeps the caret,
//! and drives sanitizing, pagination and history.
//!
//! Every mutating input updates the fragment synchronously, reports the new
//! HTML, and (re)schedules two debounced tasks: a reflow (sanitize + page
//! count) and a history snapshot. Undo/redo replace the content wholesale and
//! schedule a short settle before recording resumes.
//!
//! The surface is driven with explicit instants; it never sleeps or spawns.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::editor::cursor;
use crate::editor::document::{Fragment, Node, Selection};
use crate::editor::history::{History, HistoryState, DEFAULT_MAX_ENTRIES};
use crate::editor::pagination::{
    Measure, MeasurementTicket, PaginationEstimator, DEFAULT_PAGE_HEIGHT_PX,
};
use crate::editor::sanitizer;
use crate::editor::scheduler::{Scheduler, Task};

#[derive(Debug, Clone)]
pub struct EditorConfig {
    pub reflow_debounce: Duration,
    pub snapshot_debounce: Duration,
    pub settle_delay: Duration,
    pub max_history: usize,
    pub page_height_px: f32,
    /// Sessions untouched this long are closed.
    pub idle_timeout: Duration,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            reflow_debounce: Duration::from_millis(300),
            snapshot_debounce: Duration::from_millis(500),
            settle_delay: Duration::from_millis(100),
            max_history: DEFAULT_MAX_ENTRIES,
            page_height_px: DEFAULT_PAGE_HEIGHT_PX,
            idle_timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// Raw edit events forwarded from the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    /// Native edit: the full content after the browser applied it.
    Html { html: String },
    Text { text: String },
    Backspace,
    Enter,
    /// Clipboard contents as plain text.
    Paste { text: String },
    Select { selection: Option<Selection> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    Changed(String),
    Saved(String),
    PageCountChanged(u32),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurfaceSnapshot {
    pub html: String,
    pub selection: Option<Selection>,
    pub page_count: u32,
    /// Measured content height in px.
    pub content_height: f32,
    pub page_breaks: Vec<f32>,
    /// A reflow or settle is still due, so the page count may change.
    pub layout_pending: bool,
    pub unsaved: bool,
    pub editing: bool,
    pub history_len: usize,
    pub history_cursor: isize,
    /// Unix milliseconds of the current history entry.
    pub last_snapshot_at: Option<i64>,
    pub history_state: HistoryState,
    pub can_undo: bool,
    pub can_redo: bool,
}

pub struct EditableSurface {
    config: EditorConfig,
    fragment: Fragment,
    html: String,
    history: History,
    pagination: PaginationEstimator,
    scheduler: Scheduler,
    editing: bool,
    unsaved: bool,
}

impl EditableSurface {
    pub fn new(config: EditorConfig, measurer: Arc<dyn Measure>) -> Self {
        let history = History::new(config.max_history);
        let pagination = PaginationEstimator::new(measurer, config.page_height_px);
        Self {
            config,
            fragment: Fragment::default(),
            html: String::new(),
            history,
            pagination,
            scheduler: Scheduler::new(),
            editing: false,
            unsaved: false,
        }
    }

    // ── Edit mode ──────────────────────────────────────────────────────────

    /// Enters edit mode seeded with prior content (or an empty surface), with
    /// the caret at the end of the content and a fresh history.
    pub fn begin_editing(&mut self, seed: Option<&str>) -> Vec<SurfaceEvent> {
        let seed = seed.unwrap_or_default();
        let children = match Fragment::parse(seed) {
            Ok(parsed) => parsed.children,
            Err(err) => {
                warn!(error = %err, "seed content is not valid markup, loading it as text");
                vec![Node::Text(seed.to_string())]
            }
        };
        self.fragment.children = children;
        self.fragment.selection = Some(Selection::caret(self.fragment.content_end()));
        self.html = self.fragment.to_html();
        self.editing = true;
        self.unsaved = false;

        self.scheduler.cancel_all();
        self.history.reset();
        self.history.record(&self.html, Utc::now().timestamp_millis());

        self.paginate().into_iter().collect()
    }

    /// Re-enters edit mode on the current content. Unlike a fresh seed, the
    /// unsaved flag survives, so content that was never saved is still
    /// reported as such.
    pub fn resume_editing(&mut self) -> Vec<SurfaceEvent> {
        let unsaved = self.unsaved;
        let html = self.html.clone();
        let events = self.begin_editing(Some(&html));
        self.unsaved = unsaved;
        events
    }

    /// Leaves edit mode. Pending debounced work is dropped.
    pub fn end_editing(&mut self) {
        self.editing = false;
        self.teardown();
    }

    /// Cancels every pending scheduled task.
    pub fn teardown(&mut self) {
        self.scheduler.cancel_all();
        self.history.settle();
    }

    // ── Input ──────────────────────────────────────────────────────────────

    pub fn handle_input(&mut self, event: InputEvent, now: Instant) -> Vec<SurfaceEvent> {
        if !self.editing {
            debug!("input ignored outside edit mode");
            return Vec::new();
        }

        let changed = match event {
            InputEvent::Select { selection } => {
                self.fragment.selection = selection;
                false
            }
            InputEvent::Html { html } => self.replace_native(&html),
            InputEvent::Text { text } => self.insert_at_caret(vec![Node::Text(text)]),
            InputEvent::Paste { text } => self.insert_at_caret(paste_nodes(&text)),
            InputEvent::Enter => self.insert_at_caret(vec![Node::line_break()]),
            InputEvent::Backspace => self.delete_backward(),
        };

        if !changed {
            return Vec::new();
        }
        self.html = self.fragment.to_html();
        self.unsaved = true;
        self.scheduler
            .schedule(Task::Reflow, now, self.config.reflow_debounce);
        self.scheduler
            .schedule(Task::Snapshot, now, self.config.snapshot_debounce);
        vec![SurfaceEvent::Changed(self.html.clone())]
    }

    /// Replaces the selection (if any) with `nodes` and leaves the caret after them.
    fn insert_at_caret(&mut self, nodes: Vec<Node>) -> bool {
        let Some(markers) = cursor::save(&mut self.fragment) else {
            debug!("no active selection, input dropped");
            return false;
        };
        self.fragment.delete_between(markers.start, markers.end);
        self.fragment.insert_before_marker(markers.end, nodes);
        self.fragment.normalize();
        cursor::collapse_to_end(&mut self.fragment, markers);
        true
    }

    fn delete_backward(&mut self) -> bool {
        let collapsed = self
            .fragment
            .selection
            .as_ref()
            .is_some_and(Selection::is_collapsed);
        let Some(markers) = cursor::save(&mut self.fragment) else {
            return false;
        };
        let changed = if collapsed {
            self.fragment.delete_before_marker(markers.start)
        } else {
            self.fragment.delete_between(markers.start, markers.end);
            true
        };
        self.fragment.normalize();
        cursor::collapse_to_end(&mut self.fragment, markers);
        changed
    }

    /// Applies content the browser already edited, keeping the caret's text offset.
    fn replace_native(&mut self, html: &str) -> bool {
        let parsed = match Fragment::parse(html) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(error = %err, "native edit is not valid markup, ignored");
                return false;
            }
        };
        if parsed.to_html() == self.html {
            return false;
        }
        self.replace_children(parsed.children);
        true
    }

    fn replace_children(&mut self, children: Vec<Node>) {
        let offsets = self.caret_offsets();
        self.fragment.children = children;
        let markers = offsets
            .and_then(|(start, end)| cursor::anchor_at_text_offsets(&mut self.fragment, start, end));
        if markers.is_none() {
            self.fragment.selection = Some(Selection::caret(self.fragment.content_end()));
        }
        cursor::restore(&mut self.fragment, markers);
    }

    fn caret_offsets(&mut self) -> Option<(usize, usize)> {
        let markers = cursor::save(&mut self.fragment)?;
        let offsets = cursor::text_offsets(&self.fragment, &markers);
        cursor::restore(&mut self.fragment, Some(markers));
        offsets
    }

    // ── Scheduled work ─────────────────────────────────────────────────────

    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Runs every task whose deadline has passed.
    pub fn run_due(&mut self, now: Instant) -> Vec<SurfaceEvent> {
        let mut events = Vec::new();
        for task in self.scheduler.take_due(now) {
            match task {
                Task::Reflow => events.extend(self.reflow()),
                Task::Snapshot => self.snapshot_history(),
                Task::Settle => {
                    events.extend(self.paginate());
                    self.history.settle();
                }
            }
        }
        events
    }

    /// Sanitizes the live fragment around the caret, then re-measures.
    fn reflow(&mut self) -> Vec<SurfaceEvent> {
        let mut events: Vec<SurfaceEvent> = self.sanitize().into_iter().collect();
        events.extend(self.paginate());
        events
    }

    fn sanitize(&mut self) -> Option<SurfaceEvent> {
        let markers = cursor::save(&mut self.fragment);
        sanitizer::clean_fragment(&mut self.fragment);
        self.fragment.normalize();
        cursor::restore(&mut self.fragment, markers);

        let html = self.fragment.to_html();
        if html == self.html {
            return None;
        }
        self.html = html;
        Some(SurfaceEvent::Changed(self.html.clone()))
    }

    fn snapshot_history(&mut self) {
        let cleaned = sanitizer::clean(&self.html);
        if self
            .history
            .current()
            .is_some_and(|entry| entry.content == cleaned)
        {
            debug!("content unchanged since last snapshot");
            return;
        }
        self.history
            .record(&self.html, Utc::now().timestamp_millis());
    }

    fn paginate(&mut self) -> Option<SurfaceEvent> {
        self.pagination
            .estimate(&self.fragment)
            .map(SurfaceEvent::PageCountChanged)
    }

    // ── History ────────────────────────────────────────────────────────────

    pub fn undo(&mut self, now: Instant) -> Vec<SurfaceEvent> {
        self.step_history(now, |history| history.undo().map(|e| e.content.clone()))
    }

    pub fn redo(&mut self, now: Instant) -> Vec<SurfaceEvent> {
        self.step_history(now, |history| history.redo().map(|e| e.content.clone()))
    }

    fn step_history(
        &mut self,
        now: Instant,
        step: impl FnOnce(&mut History) -> Option<String>,
    ) -> Vec<SurfaceEvent> {
        if !self.editing {
            return Vec::new();
        }
        // A previous replacement still settling is finished early.
        if self.scheduler.cancel(Task::Settle) {
            self.history.settle();
        }
        // Edits still waiting for their snapshot are recorded first.
        if self.scheduler.cancel(Task::Snapshot) {
            self.snapshot_history();
        }

        let Some(content) = step(&mut self.history) else {
            return Vec::new();
        };
        match Fragment::parse(&content) {
            Ok(parsed) => self.replace_children(parsed.children),
            Err(err) => {
                warn!(error = %err, "history entry is not valid markup");
                self.history.settle();
                return Vec::new();
            }
        }

        self.scheduler.cancel(Task::Reflow);
        self.html = self.fragment.to_html();
        self.unsaved = true;
        self.scheduler
            .schedule(Task::Settle, now, self.config.settle_delay);
        vec![SurfaceEvent::Changed(self.html.clone())]
    }

    // ── Save ───────────────────────────────────────────────────────────────

    /// Sanitizes immediately and reports the cleaned content as saved.
    ///
    /// Outside edit mode the page count belongs to the template preview, so
    /// the content is cleaned without re-measuring.
    pub fn save(&mut self) -> Vec<SurfaceEvent> {
        self.scheduler.cancel(Task::Reflow);
        let mut events = if self.editing {
            self.reflow()
        } else {
            self.sanitize().into_iter().collect()
        };
        self.unsaved = false;
        events.push(SurfaceEvent::Saved(self.html.clone()));
        events
    }

    // ── Template measurement ───────────────────────────────────────────────

    pub fn begin_template_measurement(&mut self) -> MeasurementTicket {
        self.pagination.begin_template_measurement()
    }

    pub fn apply_template_measurement(
        &mut self,
        ticket: MeasurementTicket,
        height: f32,
    ) -> Option<SurfaceEvent> {
        self.pagination
            .apply_template_measurement(ticket, height)
            .map(SurfaceEvent::PageCountChanged)
    }

    pub fn measurer(&self) -> Arc<dyn Measure> {
        self.pagination.measurer()
    }

    // ── Accessors ──────────────────────────────────────────────────────────

    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn history_state(&self) -> HistoryState {
        self.history.state()
    }

    pub fn snapshot(&self) -> SurfaceSnapshot {
        SurfaceSnapshot {
            html: self.html.clone(),
            selection: self.fragment.selection.clone(),
            page_count: self.pagination.page_count(),
            content_height: self.pagination.last_height(),
            page_breaks: self.pagination.page_breaks(),
            layout_pending: self.scheduler.is_pending(Task::Reflow)
                || self.scheduler.is_pending(Task::Settle),
            unsaved: self.unsaved,
            editing: self.editing,
            history_len: self.history.len(),
            history_cursor: self.history.cursor(),
            last_snapshot_at: self.history.current().map(|entry| entry.timestamp),
            history_state: self.history_state(),
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
        }
    }
}

/// Plain text split on any line terminator, joined by `<br>`.
fn paste_nodes(text: &str) -> Vec<Node> {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut nodes = Vec::new();
    for (i, line) in normalized.split('\n').enumerate() {
        if i > 0 {
            nodes.push(Node::line_break());
        }
        if !line.is_empty() {
            nodes.push(Node::Text(line.to_string()));
        }
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::document::Boundary;
    use crate::editor::metrics::{default_page_layout, FontFamily, TextMetricsMeasurer};

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn surface_with(config: EditorConfig) -> EditableSurface {
        let measurer = TextMetricsMeasurer::new(default_page_layout(FontFamily::Inter));
        EditableSurface::new(config, Arc::new(measurer))
    }

    fn editing(seed: &str) -> EditableSurface {
        let mut surface = surface_with(EditorConfig::default());
        surface.begin_editing(Some(seed));
        surface
    }

    fn changed(events: &[SurfaceEvent]) -> Option<&str> {
        events.iter().rev().find_map(|event| match event {
            SurfaceEvent::Changed(html) => Some(html.as_str()),
            _ => None,
        })
    }

    fn text(s: &str) -> InputEvent {
        InputEvent::Text {
            text: s.to_string(),
        }
    }

    #[test]
    fn test_begin_editing_seeds_content_and_history() {
        let surface = editing("<div>Lead</div>");
        let snapshot = surface.snapshot();
        assert_eq!(snapshot.html, "<div>Lead</div>");
        assert!(snapshot.editing);
        assert!(!snapshot.unsaved);
        assert_eq!(snapshot.history_len, 1);
        assert_eq!(snapshot.history_cursor, 0);
        assert_eq!(snapshot.page_count, 1);
        assert_eq!(
            snapshot.selection,
            Some(Selection::caret(Boundary {
                path: vec![0, 0],
                offset: 4
            }))
        );
    }

    #[test]
    fn test_begin_editing_without_seed_is_empty() {
        let mut surface = surface_with(EditorConfig::default());
        surface.begin_editing(None);
        assert_eq!(surface.html(), "");
        let now = Instant::now();
        let events = surface.handle_input(text("Hi"), now);
        assert_eq!(changed(&events), Some("Hi"));
    }

    #[test]
    fn test_typing_inserts_at_caret_and_marks_unsaved() {
        let mut surface = editing("<div>Lead</div>");
        let now = Instant::now();
        surface.handle_input(text("er"), now);
        let events = surface.handle_input(text("!"), now);
        assert_eq!(changed(&events), Some("<div>Leader!</div>"));
        assert!(surface.snapshot().unsaved);
    }

    #[test]
    fn test_paste_splits_lines_into_breaks() {
        let mut surface = editing("");
        let events = surface.handle_input(
            InputEvent::Paste {
                text: "line1\nline2".to_string(),
            },
            Instant::now(),
        );
        assert_eq!(changed(&events), Some("line1<br>line2"));
    }

    #[test]
    fn test_paste_normalizes_line_terminators() {
        let mut surface = editing("");
        let events = surface.handle_input(
            InputEvent::Paste {
                text: "a\r\nb\rc\n".to_string(),
            },
            Instant::now(),
        );
        assert_eq!(changed(&events), Some("a<br>b<br>c<br>"));
    }

    #[test]
    fn test_paste_text_is_never_markup() {
        let mut surface = editing("");
        let events = surface.handle_input(
            InputEvent::Paste {
                text: "<b>bold</b>".to_string(),
            },
            Instant::now(),
        );
        assert_eq!(changed(&events), Some("&lt;b&gt;bold&lt;/b&gt;"));
    }

    #[test]
    fn test_enter_inserts_line_break() {
        let mut surface = editing("<p>Skills</p>");
        let now = Instant::now();
        surface.handle_input(InputEvent::Enter, now);
        let events = surface.handle_input(text("Rust"), now);
        assert_eq!(changed(&events), Some("<p>Skills<br>Rust</p>"));
    }

    #[test]
    fn test_backspace_deletes_previous_character() {
        let mut surface = editing("abc");
        let events = surface.handle_input(InputEvent::Backspace, Instant::now());
        assert_eq!(changed(&events), Some("ab"));
    }

    #[test]
    fn test_backspace_on_empty_is_noop() {
        let mut surface = editing("");
        let events = surface.handle_input(InputEvent::Backspace, Instant::now());
        assert!(events.is_empty());
        assert_eq!(surface.next_deadline(), None);
    }

    #[test]
    fn test_typing_replaces_selection() {
        let mut surface = editing("Senior engineer");
        let now = Instant::now();
        surface.handle_input(
            InputEvent::Select {
                selection: Some(Selection {
                    start: Boundary {
                        path: vec![0],
                        offset: 0,
                    },
                    end: Boundary {
                        path: vec![0],
                        offset: 6,
                    },
                }),
            },
            now,
        );
        let events = surface.handle_input(text("Staff"), now);
        assert_eq!(changed(&events), Some("Staff engineer"));
    }

    #[test]
    fn test_input_without_selection_is_dropped() {
        let mut surface = editing("abc");
        let now = Instant::now();
        surface.handle_input(InputEvent::Select { selection: None }, now);
        assert!(surface.handle_input(text("x"), now).is_empty());
        assert_eq!(surface.html(), "abc");
    }

    #[test]
    fn test_native_edit_keeps_caret_text_offset() {
        let mut surface = editing("<p>abc</p>");
        let now = Instant::now();
        let events = surface.handle_input(
            InputEvent::Html {
                html: "<p>abcd</p>".to_string(),
            },
            now,
        );
        assert_eq!(changed(&events), Some("<p>abcd</p>"));
        // Caret was after 3 characters and stays there.
        let events = surface.handle_input(text("X"), now);
        assert_eq!(changed(&events), Some("<p>abcXd</p>"));
    }

    #[test]
    fn test_debounce_coalesces_rapid_edits() {
        let mut surface = editing("a");
        let start = Instant::now();
        surface.handle_input(text("b"), start);
        surface.handle_input(text("c"), start + ms(200));

        assert_eq!(surface.next_deadline(), Some(start + ms(500)));
        surface.run_due(start + ms(499));
        assert_eq!(surface.snapshot().history_len, 1);

        surface.run_due(start + ms(700));
        assert_eq!(surface.snapshot().history_len, 2);
        assert_eq!(surface.next_deadline(), None);
    }

    #[test]
    fn test_reflow_sanitizes_live_content() {
        let mut surface = editing("");
        let start = Instant::now();
        surface.handle_input(
            InputEvent::Html {
                html: "<div>A<u></u></div><span></span>".to_string(),
            },
            start,
        );
        let events = surface.run_due(start + ms(300));
        assert_eq!(changed(&events), Some("<div>A</div>"));
        assert_eq!(surface.html(), "<div>A</div>");
    }

    #[test]
    fn test_undo_restores_previous_entry_without_recording() {
        let mut surface = editing("<div>A</div>");
        let start = Instant::now();
        surface.handle_input(
            InputEvent::Html {
                html: "<div>AB</div>".to_string(),
            },
            start,
        );
        surface.run_due(start + ms(500));
        assert_eq!(surface.snapshot().history_len, 2);

        let events = surface.undo(start + ms(600));
        assert_eq!(changed(&events), Some("<div>A</div>"));
        let snapshot = surface.snapshot();
        assert_eq!(snapshot.history_cursor, 0);
        assert_eq!(snapshot.history_len, 2);
        assert_eq!(surface.history_state(), HistoryState::Applying);

        surface.run_due(start + ms(700));
        assert_eq!(surface.history_state(), HistoryState::Idle);
        assert_eq!(surface.snapshot().history_len, 2);

        let events = surface.redo(start + ms(800));
        assert_eq!(changed(&events), Some("<div>AB</div>"));
    }

    #[test]
    fn test_undo_flushes_pending_snapshot() {
        let mut surface = editing("Lead");
        let start = Instant::now();
        surface.handle_input(text("er"), start);

        let events = surface.undo(start + ms(50));
        assert_eq!(changed(&events), Some("Lead"));
        assert_eq!(surface.snapshot().history_len, 2);

        let events = surface.redo(start + ms(60));
        assert_eq!(changed(&events), Some("Leader"));
    }

    #[test]
    fn test_consecutive_undos_within_settle_window() {
        let mut surface = editing("a");
        let start = Instant::now();
        surface.handle_input(text("b"), start);
        surface.run_due(start + ms(500));
        surface.handle_input(text("c"), start + ms(600));
        surface.run_due(start + ms(1100));
        assert_eq!(surface.snapshot().history_len, 3);

        surface.undo(start + ms(1200));
        let events = surface.undo(start + ms(1250));
        assert_eq!(changed(&events), Some("a"));
        assert_eq!(surface.snapshot().history_cursor, 0);
    }

    #[test]
    fn test_undo_keeps_caret_by_text_offset() {
        let mut surface = editing("abc");
        let start = Instant::now();
        surface.handle_input(text("d"), start);
        surface.run_due(start + ms(500));
        surface.undo(start + ms(600));
        // Caret was after "abcd"; clamped to the end of "abc".
        let events = surface.handle_input(text("Z"), start + ms(700));
        assert_eq!(changed(&events), Some("abcZ"));
    }

    #[test]
    fn test_undo_at_start_is_noop() {
        let mut surface = editing("a");
        assert!(surface.undo(Instant::now()).is_empty());
        assert_eq!(surface.history_state(), HistoryState::Idle);
    }

    #[test]
    fn test_page_count_changes_after_reflow() {
        let mut surface = surface_with(EditorConfig {
            page_height_px: 50.0,
            ..EditorConfig::default()
        });
        surface.begin_editing(Some("one"));
        let start = Instant::now();
        surface.handle_input(InputEvent::Enter, start);
        surface.handle_input(text("two"), start);
        surface.handle_input(InputEvent::Enter, start);
        surface.handle_input(text("three"), start);

        let events = surface.run_due(start + ms(300));
        // Three 21px lines on 50px pages.
        assert!(events.contains(&SurfaceEvent::PageCountChanged(2)));
        assert_eq!(surface.snapshot().page_breaks, vec![50.0]);
    }

    #[test]
    fn test_trailing_enter_does_not_add_a_page() {
        let mut surface = surface_with(EditorConfig {
            page_height_px: 30.0,
            ..EditorConfig::default()
        });
        surface.begin_editing(Some("one"));
        let start = Instant::now();
        surface.handle_input(InputEvent::Enter, start);
        surface.handle_input(InputEvent::Enter, start);
        let events = surface.run_due(start + ms(300));
        assert!(events.is_empty());
        assert_eq!(surface.snapshot().page_count, 1);
    }

    #[test]
    fn test_save_returns_sanitized_content() {
        let mut surface = editing("");
        let now = Instant::now();
        surface.handle_input(
            InputEvent::Html {
                html: "<p>Summary<b></b></p>".to_string(),
            },
            now,
        );
        let events = surface.save();
        assert_eq!(
            events.last(),
            Some(&SurfaceEvent::Saved("<p>Summary</p>".to_string()))
        );
        assert!(!surface.snapshot().unsaved);
    }

    #[test]
    fn test_save_in_preview_keeps_template_page_count() {
        let mut surface = editing("<p></p><p>a</p>");
        surface.end_editing();
        let ticket = surface.begin_template_measurement();
        assert_eq!(
            surface.apply_template_measurement(ticket, 3000.0),
            Some(SurfaceEvent::PageCountChanged(3))
        );

        let in_flight = surface.begin_template_measurement();
        let events = surface.save();
        assert_eq!(
            events,
            vec![
                SurfaceEvent::Changed("<p>a</p>".to_string()),
                SurfaceEvent::Saved("<p>a</p>".to_string()),
            ]
        );
        assert_eq!(surface.snapshot().page_count, 3);
        // The measurement started before the save is still current.
        assert_eq!(
            surface.apply_template_measurement(in_flight, 5000.0),
            Some(SurfaceEvent::PageCountChanged(5))
        );
    }

    #[test]
    fn test_resume_editing_keeps_unsaved_flag() {
        let mut surface = editing("Lead");
        surface.handle_input(text("er"), Instant::now());
        surface.end_editing();

        surface.resume_editing();
        let snapshot = surface.snapshot();
        assert!(snapshot.editing);
        assert!(snapshot.unsaved);
        assert_eq!(snapshot.html, "Leader");

        surface.save();
        surface.end_editing();
        surface.resume_editing();
        assert!(!surface.snapshot().unsaved);
    }

    #[test]
    fn test_snapshot_reports_pending_layout_and_last_entry_time() {
        let mut surface = editing("a");
        let first = surface.snapshot().last_snapshot_at;
        assert!(first.is_some());

        let start = Instant::now();
        surface.handle_input(text("b"), start);
        assert!(surface.snapshot().layout_pending);

        surface.run_due(start + ms(600));
        let snapshot = surface.snapshot();
        assert!(!snapshot.layout_pending);
        assert_eq!(snapshot.history_len, 2);
        assert!(snapshot.last_snapshot_at >= first);
    }

    #[test]
    fn test_end_editing_cancels_pending_work() {
        let mut surface = editing("a");
        let start = Instant::now();
        surface.handle_input(text("b"), start);
        assert!(surface.next_deadline().is_some());

        surface.end_editing();
        assert_eq!(surface.next_deadline(), None);
        assert!(surface.run_due(start + ms(10_000)).is_empty());
        assert!(surface.handle_input(text("c"), start).is_empty());
        assert_eq!(surface.snapshot().history_len, 1);
    }

    #[test]
    fn test_input_event_wire_format() {
        let event: InputEvent =
            serde_json::from_str(r#"{"type":"paste","text":"a\nb"}"#).unwrap();
        assert_eq!(
            event,
            InputEvent::Paste {
                text: "a\nb".to_string()
            }
        );
        let event: InputEvent = serde_json::from_str(r#"{"type":"backspace"}"#).unwrap();
        assert_eq!(event, InputEvent::Backspace);
    }
}
