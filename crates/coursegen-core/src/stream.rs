//! Per-response stream state.
//!
//! [`ResponseStream`] is a plain reducer: every fragment goes through
//! normalization, buffering, extraction and classification, and the caller
//! gets back everything the fragment produced. It knows nothing about the
//! shared tree or about other responses.
//!
//! Text is classified once it is final. An in-flight JSON block and a
//! trailing partial marker stay unsettled until a later fragment resolves
//! them, or until the stream finishes and everything left is flushed.

use crate::classifier::{classify, Classification};
use crate::error::CoursegenError;
use crate::extractor::{DataBlock, ModificationExtractor, SeenKeys};
use crate::normalizer::strip_framing;
use crate::Result;
use chrono::{DateTime, Utc};
use coursegen_types::{Modification, ProcessingStatus, ResponsePhase, SectionDraft, SectionKind};
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

/// Everything one fragment produced.
#[derive(Debug, Clone, Default)]
pub struct FragmentOutput {
    /// Status after the fragment.
    pub status: ProcessingStatus,
    /// Set when the fragment changed the status.
    pub entered: Option<ProcessingStatus>,
    /// Sections to append, in order.
    pub drafts: Vec<SectionDraft>,
    /// Modifications not seen before in this response.
    pub modifications: Vec<Modification>,
    /// Structured-data blocks completed by the fragment.
    pub blocks: Vec<DataBlock>,
}

impl FragmentOutput {
    pub fn is_empty(&self) -> bool {
        self.entered.is_none()
            && self.drafts.is_empty()
            && self.modifications.is_empty()
            && self.blocks.is_empty()
    }
}

/// State of one response stream.
///
/// The buffer, extractor and seen keys are released when the stream ends;
/// only the summary fields survive.
#[derive(Debug)]
pub struct ResponseStream {
    id: Uuid,
    buffer: String,
    /// Buffer offset up to which text has been classified.
    settled: usize,
    received: usize,
    status: ProcessingStatus,
    phase: ResponsePhase,
    seen: SeenKeys,
    extractor: ModificationExtractor,
    fragments: usize,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    superseded_by: Option<Uuid>,
    error: Option<String>,
}

impl ResponseStream {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            buffer: String::new(),
            settled: 0,
            received: 0,
            status: ProcessingStatus::Idle,
            phase: ResponsePhase::Receiving,
            seen: SeenKeys::new(),
            extractor: ModificationExtractor::new(),
            fragments: 0,
            started_at: Utc::now(),
            finished_at: None,
            superseded_by: None,
            error: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> ResponsePhase {
        self.phase
    }

    pub fn status(&self) -> ProcessingStatus {
        self.status
    }

    /// Normalized text received so far. Empty once the stream has ended.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Normalized bytes received over the stream's lifetime.
    pub fn received_bytes(&self) -> usize {
        self.received
    }

    pub fn fragments(&self) -> usize {
        self.fragments
    }

    pub fn seen(&self) -> &SeenKeys {
        &self.seen
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn superseded_by(&self) -> Option<Uuid> {
        self.superseded_by
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Fail unless the stream still accepts input.
    pub fn ensure_open(&self) -> Result<()> {
        match self.phase {
            ResponsePhase::Receiving => Ok(()),
            ResponsePhase::Superseded => Err(CoursegenError::ResponseSuperseded {
                id: self.id,
                by: self.superseded_by.unwrap_or_default(),
            }),
            phase => Err(CoursegenError::ResponseClosed { id: self.id, phase }),
        }
    }

    /// Process one raw fragment.
    pub fn ingest(&mut self, raw: &str) -> Result<FragmentOutput> {
        self.ensure_open()?;
        self.fragments += 1;

        let chunk = strip_framing(raw);
        if chunk.is_empty() {
            return Ok(FragmentOutput {
                status: self.status,
                ..FragmentOutput::default()
            });
        }
        self.received += chunk.len();
        self.buffer.push_str(&chunk);

        let extraction = self.extractor.extract(&self.buffer, &self.seen);
        self.seen = extraction.seen;

        let classification = self.settle(&extraction.blocks, false);

        let mut drafts: Vec<SectionDraft> = classification.emitted.into_iter().collect();
        drafts.extend(extraction.blocks.iter().map(|block| {
            SectionDraft::new(SectionKind::StructuredData, block.text.clone()).with_metadata(json!({
                "modifications": block.accepted,
                "rejected": block.rejected,
            }))
        }));

        if !extraction.modifications.is_empty() {
            debug!(
                target: "coursegen::extractor",
                "Response {}: {} new modification(s)",
                self.id,
                extraction.modifications.len()
            );
        }

        Ok(FragmentOutput {
            status: self.status,
            entered: classification.entered,
            drafts,
            modifications: extraction.modifications,
            blocks: extraction.blocks,
        })
    }

    /// Classify the text that became final, skipping the completed blocks.
    ///
    /// When `closing`, an unfinished block and any held marker prefix are
    /// flushed as text.
    fn settle(&mut self, blocks: &[DataBlock], closing: bool) -> Classification {
        let limit = match self.extractor.pending() {
            Some(start) if !closing => start,
            _ => self.buffer.len(),
        };

        let mut text = String::new();
        let mut pos = self.settled;
        for block in blocks {
            text.push_str(&self.buffer[pos..block.start]);
            pos = block.end;
        }
        text.push_str(&self.buffer[pos..limit]);

        // Only a contiguous tail at the very end of the buffer can grow into a marker
        let holdable = if !closing && limit == self.buffer.len() {
            limit - pos
        } else {
            0
        };

        let classification = classify(&text, self.status, holdable);
        if let Some(entered) = classification.entered {
            debug!(target: "coursegen::classifier", "Response {} is now {}", self.id, entered);
        }
        self.status = classification.status;
        self.settled = limit - classification.held;
        classification
    }

    /// Close the stream normally.
    ///
    /// If `final_text` extends what was buffered, the missing suffix is
    /// processed first as one last fragment. Text still unsettled after
    /// that is flushed as a text section.
    pub fn finish(&mut self, final_text: &str) -> Result<FragmentOutput> {
        self.ensure_open()?;

        let final_text = strip_framing(final_text);
        let mut output = match final_text.strip_prefix(self.buffer.as_str()) {
            Some(suffix) if !suffix.is_empty() => {
                debug!(target: "coursegen::stream", "Response {}: feeding {} byte final suffix", self.id, suffix.len());
                let suffix = suffix.to_string();
                self.ingest(&suffix)?
            }
            Some(_) => FragmentOutput::default(),
            None => {
                if !final_text.is_empty() {
                    debug!(target: "coursegen::stream", "Response {}: final text diverges from stream, ignoring it", self.id);
                }
                FragmentOutput::default()
            }
        };

        let flushed = self.settle(&[], true);
        if flushed.entered.is_some() {
            output.entered = flushed.entered;
        }
        output.drafts.extend(flushed.emitted);
        output.status = self.status;

        self.close(ResponsePhase::Complete);
        Ok(output)
    }

    /// Close the stream after a transport failure.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        self.ensure_open()?;
        self.error = Some(message.into());
        self.close(ResponsePhase::Error);
        Ok(())
    }

    /// Cancel a stream that a newer response replaces. Returns false when the
    /// stream had already ended.
    pub fn supersede(&mut self, by: Uuid) -> bool {
        if self.phase.is_terminal() {
            return false;
        }
        self.superseded_by = Some(by);
        self.close(ResponsePhase::Superseded);
        true
    }

    /// Enter a terminal phase and drop the per-stream working state.
    fn close(&mut self, phase: ResponsePhase) {
        self.phase = phase;
        self.finished_at = Some(Utc::now());
        self.buffer = String::new();
        self.settled = 0;
        self.seen = SeenKeys::new();
        self.extractor = ModificationExtractor::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADD_INTRO: &str = r#"{"modifications":[{"action":"ADD","targetType":"MODULE","parentPath":"C1.S1","node":{"id":"M1","name":"Intro"}}]}"#;

    fn kinds(output: &FragmentOutput) -> Vec<SectionKind> {
        output.drafts.iter().map(|d| d.kind).collect()
    }

    #[test]
    fn test_scenario_fragments() {
        let mut stream = ResponseStream::new(Uuid::new_v4());

        let first = stream.ingest("[Thinking...] planning the module").unwrap();
        assert_eq!(first.entered, Some(ProcessingStatus::Thinking));
        assert_eq!(kinds(&first), vec![SectionKind::Thinking]);

        let second = stream.ingest("...").unwrap();
        assert!(second.is_empty());
        assert_eq!(second.status, ProcessingStatus::Thinking);

        let third = stream.ingest(ADD_INTRO).unwrap();
        assert_eq!(kinds(&third), vec![SectionKind::StructuredData]);
        assert_eq!(third.modifications.len(), 1);
        assert_eq!(third.drafts[0].content, ADD_INTRO);
        assert_eq!(third.drafts[0].metadata, Some(json!({"modifications": 1, "rejected": 0})));

        assert_eq!(stream.fragments(), 3);
        assert!(stream.buffer().ends_with(ADD_INTRO));
    }

    #[test]
    fn test_split_block_yields_modification_once() {
        let mut stream = ResponseStream::new(Uuid::new_v4());
        let (head, tail) = ADD_INTRO.split_at(40);

        let first = stream.ingest(head).unwrap();
        assert!(first.modifications.is_empty());
        assert!(first.drafts.is_empty());

        let second = stream.ingest(tail).unwrap();
        assert_eq!(second.modifications.len(), 1);

        let again = stream.ingest(ADD_INTRO).unwrap();
        assert!(again.modifications.is_empty());
        assert_eq!(again.blocks.len(), 1);
        assert_eq!(stream.seen().len(), 1);
    }

    #[test]
    fn test_finish_feeds_missing_suffix() {
        let mut stream = ResponseStream::new(Uuid::new_v4());
        stream.ingest("Building: ").unwrap();

        let output = stream.finish(&format!("Building: {ADD_INTRO}")).unwrap();
        assert_eq!(output.modifications.len(), 1);
        assert_eq!(stream.phase(), ResponsePhase::Complete);
        assert!(stream.finished_at().is_some());
    }

    #[test]
    fn test_finish_ignores_divergent_final_text() {
        let mut stream = ResponseStream::new(Uuid::new_v4());
        stream.ingest("one").unwrap();
        let output = stream.finish("something else").unwrap();
        assert!(output.is_empty());
        assert_eq!(stream.received_bytes(), 3);
    }

    #[test]
    fn test_terminal_phases_reject_input() {
        let mut done = ResponseStream::new(Uuid::new_v4());
        done.finish("").unwrap();
        assert!(matches!(
            done.ingest("late"),
            Err(CoursegenError::ResponseClosed { phase: ResponsePhase::Complete, .. })
        ));
        assert!(done.fail("boom").is_err());
        assert!(!done.supersede(Uuid::new_v4()));

        let mut failed = ResponseStream::new(Uuid::new_v4());
        failed.fail("connection reset").unwrap();
        assert_eq!(failed.error(), Some("connection reset"));
        assert!(failed.finish("").is_err());
    }

    #[test]
    fn test_superseded_stream_rejects_fragments() {
        let mut stream = ResponseStream::new(Uuid::new_v4());
        let newer = Uuid::new_v4();
        assert!(stream.supersede(newer));

        match stream.ingest(ADD_INTRO) {
            Err(CoursegenError::ResponseSuperseded { by, .. }) => assert_eq!(by, newer),
            other => panic!("expected superseded error, got {other:?}"),
        }
        assert!(stream.buffer().is_empty());
        assert_eq!(stream.fragments(), 0);
    }

    fn contents(output: &FragmentOutput) -> Vec<&str> {
        output.drafts.iter().map(|d| d.content.as_str()).collect()
    }

    #[test]
    fn test_stray_brace_before_block() {
        let mut stream = ResponseStream::new(Uuid::new_v4());

        let intro = stream.ingest("Tip: a JSON object starts with {. Here it is:\n").unwrap();
        assert_eq!(kinds(&intro), vec![SectionKind::Text]);
        assert!(intro.drafts[0].content.contains("starts with {."));

        let block = stream.ingest(ADD_INTRO).unwrap();
        assert_eq!(block.modifications.len(), 1);
        assert_eq!(kinds(&block), vec![SectionKind::StructuredData]);

        let tail = stream.ingest("\nAll done...").unwrap();
        assert_eq!(kinds(&tail), vec![SectionKind::Text]);
        assert!(tail.drafts[0].content.contains("All done"));
    }

    #[test]
    fn test_brace_held_until_it_proves_to_be_prose() {
        let mut stream = ResponseStream::new(Uuid::new_v4());

        let first = stream.ingest("An object starts with {").unwrap();
        assert_eq!(contents(&first), vec!["An object starts with "]);

        let second = stream.ingest(". Example follows.").unwrap();
        assert_eq!(contents(&second), vec!["{. Example follows."]);
    }

    #[test]
    fn test_braces_in_prose_stay_in_text() {
        let mut stream = ResponseStream::new(Uuid::new_v4());
        let output = stream.ingest("Use the {name} placeholder in titles.").unwrap();
        assert_eq!(contents(&output), vec!["Use the {name} placeholder in titles."]);
        assert!(output.blocks.is_empty());
    }

    #[test]
    fn test_block_in_flight_is_not_text() {
        let mut stream = ResponseStream::new(Uuid::new_v4());

        let first = stream.ingest("Plan: {\"modifications\":[").unwrap();
        assert_eq!(contents(&first), vec!["Plan: "]);

        let second = stream.ingest("{\"action\":\"ADD\"}").unwrap();
        assert!(second.drafts.is_empty());

        let third = stream.ingest("]} done").unwrap();
        assert_eq!(
            kinds(&third),
            vec![SectionKind::Text, SectionKind::StructuredData]
        );
        assert_eq!(third.drafts[0].content, " done");
        assert_eq!(third.drafts[1].metadata, Some(json!({"modifications": 0, "rejected": 1})));
    }

    #[test]
    fn test_marker_inside_json_string_is_ignored() {
        let mut stream = ResponseStream::new(Uuid::new_v4());
        let output = stream.ingest("{\"name\": \"[Thinking...]\"}").unwrap();
        assert!(output.entered.is_none());
        assert_eq!(output.status, ProcessingStatus::Idle);
        assert_eq!(kinds(&output), vec![SectionKind::StructuredData]);
    }

    #[test]
    fn test_partial_marker_text_is_not_lost() {
        let mut stream = ResponseStream::new(Uuid::new_v4());
        let first = stream.ingest("Notes on [Gen").unwrap();
        let second = stream.ingest("eral relativity]").unwrap();
        assert_eq!(contents(&first), vec!["Notes on "]);
        assert_eq!(contents(&second), vec!["[General relativity]"]);
        assert_eq!(stream.status(), ProcessingStatus::Idle);
    }

    #[test]
    fn test_finish_flushes_unsettled_text() {
        let mut stream = ResponseStream::new(Uuid::new_v4());
        stream.ingest("see [Thin").unwrap();
        let output = stream.finish("").unwrap();
        assert_eq!(contents(&output), vec!["[Thin"]);

        let mut cut_off = ResponseStream::new(Uuid::new_v4());
        cut_off.ingest("{\"modifications\": [").unwrap();
        let output = cut_off.finish("").unwrap();
        assert_eq!(contents(&output), vec!["{\"modifications\": ["]);
        assert!(output.modifications.is_empty());
    }

    #[test]
    fn test_terminal_phase_releases_working_state() {
        let mut stream = ResponseStream::new(Uuid::new_v4());
        stream.ingest(ADD_INTRO).unwrap();
        stream.ingest("{\"partial\": ").unwrap();
        assert!(!stream.seen().is_empty());

        stream.finish("").unwrap();
        assert!(stream.buffer().is_empty());
        assert!(stream.seen().is_empty());
        assert_eq!(stream.received_bytes(), ADD_INTRO.len() + 12);
        assert_eq!(stream.fragments(), 2);

        let mut superseded = ResponseStream::new(Uuid::new_v4());
        superseded.ingest("some text").unwrap();
        assert!(superseded.supersede(Uuid::new_v4()));
        assert!(superseded.buffer().is_empty());
        assert_eq!(superseded.received_bytes(), 9);
    }

    #[test]
    fn test_sse_framed_fragments() {
        let mut stream = ResponseStream::new(Uuid::new_v4());
        let output = stream.ingest("data: [Generating...] writing\n\n").unwrap();
        assert_eq!(output.entered, Some(ProcessingStatus::Generating));
        assert_eq!(output.drafts[0].content, "writing");
        assert_eq!(stream.buffer(), "[Generating...] writing");
    }
}
