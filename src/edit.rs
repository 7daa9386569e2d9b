//! Byte-range edit batches.
//!
//! The rewrite planner produces [`SourceEdit`]s against the original text;
//! [`apply_edits`] splices them bottom-to-top so earlier offsets stay valid
//! throughout the batch. Overlapping edits always indicate a planner bug
//! and abort the file with the source unchanged.

use crate::error::{Result, UnflagError};

/// A single byte-range replacement.
///
/// `length == 0` is an insertion; an empty `replacement` is a deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEdit {
    pub offset: usize,
    pub length: usize,
    pub replacement: String,
}

impl SourceEdit {
    pub fn new(offset: usize, length: usize, replacement: impl Into<String>) -> Self {
        Self {
            offset,
            length,
            replacement: replacement.into(),
        }
    }

    /// Deletion of a byte range.
    pub fn delete(offset: usize, length: usize) -> Self {
        Self::new(offset, length, "")
    }

    pub fn end(&self) -> usize {
        self.offset + self.length
    }
}

/// Apply a batch of edits to `source`.
///
/// Pure function of `(source, edits)`. Edits are sorted by offset
/// descending and applied as literal string splices; any pair of
/// overlapping ranges fails the whole batch with `OverlappingEdits`,
/// and a range past the end of the source fails with `InvalidRange`.
pub fn apply_edits(source: &str, edits: &[SourceEdit]) -> Result<String> {
    if edits.is_empty() {
        return Ok(source.to_string());
    }

    for edit in edits {
        if edit.end() > source.len() {
            return Err(UnflagError::InvalidRange {
                offset: edit.offset,
                length: edit.length,
                source_len: source.len(),
            });
        }
        if !source.is_char_boundary(edit.offset) || !source.is_char_boundary(edit.end()) {
            return Err(UnflagError::InvalidRange {
                offset: edit.offset,
                length: edit.length,
                source_len: source.len(),
            });
        }
    }

    // Bottom-to-top: descending by offset, ties broken by descending end so
    // a zero-length insertion at the same offset lands after the check.
    let mut sorted: Vec<&SourceEdit> = edits.iter().collect();
    sorted.sort_by(|a, b| {
        b.offset
            .cmp(&a.offset)
            .then_with(|| b.end().cmp(&a.end()))
    });

    // After the descending sort, window[0] starts at or after window[1].
    // The pair overlaps when the lower edit's end reaches past the higher
    // edit's start.
    for window in sorted.windows(2) {
        let higher = window[0];
        let lower = window[1];
        let overlaps = if higher.offset == lower.offset {
            // Two edits at the same offset only coexist when at most one
            // of them consumes bytes.
            higher.length > 0 && lower.length > 0
        } else {
            lower.end() > higher.offset
        };
        if overlaps {
            return Err(UnflagError::OverlappingEdits {
                first_offset: lower.offset,
                first_end: lower.end(),
                second_offset: higher.offset,
                second_end: higher.end(),
            });
        }
    }

    let mut result = source.to_string();
    for edit in &sorted {
        result.replace_range(edit.offset..edit.end(), &edit.replacement);
    }
    Ok(result)
}
