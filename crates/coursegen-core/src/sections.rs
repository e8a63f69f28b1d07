//! Per-response ordered section logs.

use coursegen_types::{Section, SectionDraft};
use std::collections::HashMap;
use uuid::Uuid;

/// Append-only section logs keyed by response id.
///
/// Entries are never reordered, edited or removed while a response is
/// known, so a reader polling mid-stream always sees a growing prefix.
#[derive(Debug, Default)]
pub struct SectionAccumulator {
    logs: HashMap<Uuid, Vec<Section>>,
}

impl SectionAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp a draft and append it to the response's log.
    pub fn append(&mut self, response_id: Uuid, draft: SectionDraft) -> Section {
        let section = Section::from_draft(response_id, draft);
        self.logs.entry(response_id).or_default().push(section.clone());
        section
    }

    /// All sections for a response, in emission order.
    pub fn sections(&self, response_id: Uuid) -> Vec<Section> {
        self.sections_since(response_id, 0)
    }

    /// Sections from index `offset` onward, for incremental polling.
    pub fn sections_since(&self, response_id: Uuid, offset: usize) -> Vec<Section> {
        self.logs
            .get(&response_id)
            .map(|log| log.get(offset..).unwrap_or_default().to_vec())
            .unwrap_or_default()
    }

    /// Number of sections logged for a response.
    pub fn len(&self, response_id: Uuid) -> usize {
        self.logs.get(&response_id).map_or(0, Vec::len)
    }

    /// Drop a response's log entirely.
    pub fn forget(&mut self, response_id: Uuid) -> bool {
        self.logs.remove(&response_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursegen_types::SectionKind;

    #[test]
    fn test_append_preserves_order_per_response() {
        let mut acc = SectionAccumulator::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        acc.append(a, SectionDraft::new(SectionKind::Thinking, "first"));
        acc.append(b, SectionDraft::new(SectionKind::Text, "other"));
        acc.append(a, SectionDraft::new(SectionKind::Text, "second"));

        let contents: Vec<_> = acc.sections(a).into_iter().map(|s| s.content).collect();
        assert_eq!(contents, vec!["first", "second"]);
        assert_eq!(acc.len(b), 1);
        assert!(acc.sections(b).iter().all(|s| s.response_id == b));
    }

    #[test]
    fn test_reads_see_growing_prefix() {
        let mut acc = SectionAccumulator::new();
        let id = Uuid::new_v4();

        acc.append(id, SectionDraft::new(SectionKind::Thinking, "one"));
        let early = acc.sections(id);

        acc.append(id, SectionDraft::new(SectionKind::Text, "two"));
        let late = acc.sections(id);

        assert_eq!(late.len(), 2);
        assert_eq!(&late[..early.len()], early.as_slice());
    }

    #[test]
    fn test_sections_since() {
        let mut acc = SectionAccumulator::new();
        let id = Uuid::new_v4();
        for n in 0..3 {
            acc.append(id, SectionDraft::new(SectionKind::Text, n.to_string()));
        }
        assert_eq!(acc.sections_since(id, 2).len(), 1);
        assert!(acc.sections_since(id, 10).is_empty());
        assert!(acc.sections_since(Uuid::new_v4(), 0).is_empty());
    }

    #[test]
    fn test_forget() {
        let mut acc = SectionAccumulator::new();
        let id = Uuid::new_v4();
        acc.append(id, SectionDraft::new(SectionKind::Text, "x"));
        assert!(acc.forget(id));
        assert_eq!(acc.len(id), 0);
        assert!(!acc.forget(id));
    }
}
