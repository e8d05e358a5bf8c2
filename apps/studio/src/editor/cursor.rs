//! Cursor Preservation — keeps the caret/selection across destructive edits.
//!
//! `save` brackets the active selection with two invisible markers; `restore`
//! rebuilds the selection from them and always removes both. Failures only
//! cost the caret position, so they degrade to a no-op instead of erroring.

use tracing::debug;

use crate::editor::document::{Boundary, Fragment, MarkerId, Node, Selection};

/// Handles to the two markers bracketing a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionMarkers {
    pub start: MarkerId,
    pub end: MarkerId,
}

/// Inserts markers at the start and end of the active selection.
///
/// Returns `None` when there is no selection or a boundary is invalid.
pub fn save(fragment: &mut Fragment) -> Option<SelectionMarkers> {
    let selection = fragment.selection.clone()?;
    let start = fragment.new_marker();
    let end = fragment.new_marker();

    // End goes in first: it never shifts the start boundary.
    if !fragment.insert_marker(&selection.end, end) {
        debug!(?selection, "selection end is detached; caret not saved");
        return None;
    }
    // A caret's boundary may now point at the end marker itself.
    if selection.is_collapsed() {
        fragment.insert_before_marker(end, vec![Node::Marker(start)]);
        return Some(SelectionMarkers { start, end });
    }
    if !fragment.insert_marker(&selection.start, start) {
        fragment.remove_marker(end);
        debug!(?selection, "selection start is detached; caret not saved");
        return None;
    }
    Some(SelectionMarkers { start, end })
}

/// Restores the selection spanning the two markers, then removes them.
///
/// Cleanup is unconditional: a marker that is still attached is removed even
/// if its partner was lost.
pub fn restore(fragment: &mut Fragment, markers: Option<SelectionMarkers>) {
    let Some(markers) = markers else {
        return;
    };
    // Start first, so the end path is read from the tree the selection lives in.
    let start_path = fragment.remove_marker(markers.start);
    let end_path = fragment.remove_marker(markers.end);

    match (start_path, end_path) {
        (Some(start), Some(end)) => {
            fragment.selection = Some(Selection {
                start: boundary_at(start),
                end: boundary_at(end),
            });
        }
        _ => debug!("selection markers were detached; caret not restored"),
    }
}

/// Removes both markers and leaves a caret where the end marker was.
pub fn collapse_to_end(fragment: &mut Fragment, markers: SelectionMarkers) {
    fragment.remove_marker(markers.start);
    match fragment.remove_marker(markers.end) {
        Some(end) => fragment.selection = Some(Selection::caret(boundary_at(end))),
        None => debug!("end marker was detached; caret not collapsed"),
    }
}

/// Re-anchors markers at text offsets, for content that was replaced wholesale.
pub fn anchor_at_text_offsets(
    fragment: &mut Fragment,
    start_offset: usize,
    end_offset: usize,
) -> Option<SelectionMarkers> {
    let start = fragment.new_marker();
    let end = fragment.new_marker();
    if !fragment.insert_marker_at_text_offset(end_offset, end) {
        return None;
    }
    if start_offset >= end_offset {
        fragment.insert_before_marker(end, vec![Node::Marker(start)]);
        return Some(SelectionMarkers { start, end });
    }
    if !fragment.insert_marker_at_text_offset(start_offset, start) {
        fragment.remove_marker(end);
        return None;
    }
    Some(SelectionMarkers { start, end })
}

/// Text offsets of both markers, if both are attached.
pub fn text_offsets(fragment: &Fragment, markers: &SelectionMarkers) -> Option<(usize, usize)> {
    Some((
        fragment.text_offset_of_marker(markers.start)?,
        fragment.text_offset_of_marker(markers.end)?,
    ))
}

/// The position a removed marker occupied: its parent and its child index.
fn boundary_at(mut marker_path: Vec<usize>) -> Boundary {
    let offset = marker_path.pop().unwrap_or_default();
    Boundary {
        path: marker_path,
        offset,
    }
}
