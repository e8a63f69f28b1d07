//! Marker-based classification of settled stream text.
//!
//! The generator announces what it is doing with literal markers
//! (`[Thinking...]`, `[Generating...]` or their emoji forms). A marker may be
//! split across two fragments, so text that ends with the beginning of a
//! marker is held back. The next fragment is classified together with it,
//! which finds the whole marker when it completes and shows the held text
//! when it does not.
//!
//! The caller hands over text that has become final: structured-data blocks
//! are already cut out and an in-flight block is not included yet, so
//! markers inside JSON never count.

use crate::normalizer::displayable_text;
use coursegen_types::{ProcessingStatus, SectionDraft, SectionKind};
use std::ops::Range;

/// Marker literals and the status each one announces.
pub const MARKERS: [(&str, ProcessingStatus); 4] = [
    ("[Thinking...]", ProcessingStatus::Thinking),
    ("🤔", ProcessingStatus::Thinking),
    ("[Generating...]", ProcessingStatus::Generating),
    ("✨", ProcessingStatus::Generating),
];

/// Outcome of classifying one piece of settled text.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Status after this text.
    pub status: ProcessingStatus,
    /// Set when this text moved the stream into a new status.
    pub entered: Option<ProcessingStatus>,
    /// Section to append, if any.
    pub emitted: Option<SectionDraft>,
    /// Bytes at the end of the input held back as a possible marker start.
    /// They were not classified and must be passed in again next time.
    pub held: usize,
}

/// Classify text that has just become final.
///
/// At most the last `holdable` bytes may be held back as the start of a
/// marker; pass 0 when nothing more will arrive. Pure function of its
/// inputs.
pub fn classify(text: &str, current: ProcessingStatus, holdable: usize) -> Classification {
    let held = trailing_partial_marker(text)
        .filter(|len| *len <= holdable)
        .unwrap_or(0);
    let visible = &text[..text.len() - held];

    let mut hits: Vec<(Range<usize>, ProcessingStatus)> = MARKERS
        .iter()
        .flat_map(|&(marker, status)| {
            visible
                .match_indices(marker)
                .map(move |(start, m)| (start..start + m.len(), status))
        })
        .collect();
    hits.sort_by_key(|(range, _)| range.start);

    let mut content = String::with_capacity(visible.len());
    let mut pos = 0;
    for (range, _) in &hits {
        content.push_str(&visible[pos..range.start]);
        pos = range.end;
    }
    content.push_str(&visible[pos..]);

    let status = hits.last().map(|(_, status)| *status).unwrap_or(current);
    let entered = (status != current).then_some(status);

    let emitted = match entered.and_then(status_section_kind) {
        Some(kind) => Some(SectionDraft::new(kind, content.trim())),
        None => displayable_text(&content).map(|text| SectionDraft::new(SectionKind::Text, text)),
    };

    Classification {
        status,
        entered,
        emitted,
        held,
    }
}

fn status_section_kind(status: ProcessingStatus) -> Option<SectionKind> {
    match status {
        ProcessingStatus::Thinking => Some(SectionKind::Thinking),
        ProcessingStatus::Generating => Some(SectionKind::Generating),
        ProcessingStatus::Idle => None,
    }
}

/// Byte length of the longest proper marker prefix `text` ends with.
fn trailing_partial_marker(text: &str) -> Option<usize> {
    MARKERS
        .iter()
        .flat_map(|&(marker, _)| marker.char_indices().skip(1).map(move |(len, _)| &marker[..len]))
        .filter(|prefix| text.ends_with(*prefix))
        .map(str::len)
        .max()
}
