// Offset anchors and their transformation under document edits.
//
// A comment is anchored to a half-open character span `[start, end)` of
// a document's text. When the build pipeline reports content edits for
// a path, every stored span on that path is remapped so it keeps
// pointing at the same prose where possible. Spans that the edit
// swallowed are clamped, never dropped.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Half-open character range `[start, end)` within a document.
///
/// Invariant: `start < end`. Every span handed out by this module
/// upholds it, including spans collapsed by a destructive edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetSpan {
    pub start: u32,
    pub end: u32,
}

impl OffsetSpan {
    pub fn is_valid(self) -> bool {
        self.start < self.end
    }
}

/// One content edit against a single snapshot of a document: the span
/// `[start, end)` of the old text was replaced by `inserted_len`
/// characters of new text.
///
/// `start == end` is a pure insertion; `inserted_len == 0` is a pure
/// deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentEdit {
    pub start: u32,
    pub end: u32,
    pub inserted_len: u32,
}

impl ContentEdit {
    /// Signed length change contributed by this edit.
    pub fn delta(self) -> i64 {
        i64::from(self.inserted_len) - i64::from(self.end - self.start)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditBatchError {
    #[error("edit batch is empty")]
    Empty,

    #[error("edit {index} has end < start")]
    Inverted { index: usize },

    #[error("edit {index} overlaps or precedes the edit before it")]
    Overlapping { index: usize },
}

/// Validate that a batch of edits applies cleanly to one snapshot:
/// non-empty, each edit well-formed, ascending by `start`, and
/// non-overlapping (`edits[i].end <= edits[i + 1].start`).
pub fn validate_edits(edits: &[ContentEdit]) -> Result<(), EditBatchError> {
    if edits.is_empty() {
        return Err(EditBatchError::Empty);
    }

    for (index, edit) in edits.iter().enumerate() {
        if edit.end < edit.start {
            return Err(EditBatchError::Inverted { index });
        }
        if index > 0 && edits[index - 1].end > edit.start {
            return Err(EditBatchError::Overlapping { index });
        }
    }

    Ok(())
}

/// Remap a stored span through a validated edit batch.
///
/// Positions past an edit shift by its signed delta (cumulative over
/// all edits that end at or before the position). A position inside an
/// edited region is clamped to that region's remapped start boundary.
/// If the remapped span collapses (`start >= end`) it becomes the
/// single-point span `{p, p + 1}` at the collapse point, so the
/// comment survives with an admittedly imprecise anchor instead of
/// vanishing or violating the span invariant.
pub fn transform_span(span: OffsetSpan, edits: &[ContentEdit]) -> OffsetSpan {
    let start = map_position(span.start, edits);
    let end = map_position(span.end, edits);

    if start < end {
        OffsetSpan { start, end }
    } else {
        let point = start.min(end);
        OffsetSpan { start: point, end: point.saturating_add(1) }
    }
}

/// Map one old-text position into the new text.
fn map_position(position: u32, edits: &[ContentEdit]) -> u32 {
    let mut delta: i64 = 0;

    for edit in edits {
        if edit.end <= position {
            delta += edit.delta();
        } else if edit.start <= position {
            // Inside the replaced region: clamp to its remapped start.
            return shifted(edit.start, delta);
        } else {
            break;
        }
    }

    shifted(position, delta)
}

fn shifted(position: u32, delta: i64) -> u32 {
    // A validated ascending batch can only remove text that lies before
    // `position`, so the sum cannot push it below zero; saturate anyway
    // rather than wrap.
    u32::try_from((i64::from(position) + delta).max(0)).unwrap_or(u32::MAX)
}
