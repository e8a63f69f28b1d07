//! Structural-edit extraction from the cumulative response buffer.
//!
//! Structured data arrives as JSON objects embedded in prose and split at
//! arbitrary fragment boundaries. Every `{` outside an accepted block is a
//! candidate start, and the text from there is run through serde_json's
//! streaming parser. The parser tracks object and array nesting and skips
//! delimiters inside string literals, so a `}` in a node name cannot close a
//! block early. A candidate then ends one of three ways:
//!
//! - the object closes and becomes a [`DataBlock`]; scanning resumes after it
//! - the text runs out first and the candidate waits for more input
//! - a syntax error shows the brace was prose; scanning resumes at the next
//!   `{` after it, so a stray brace never hides a later block
//!
//! [`ModificationExtractor`] remembers where it stopped, so repeated calls on
//! a growing buffer only look at the new suffix plus any waiting candidate.
//! [`extract`] runs a fresh scan over the whole buffer; both give the same
//! results.

use coursegen_types::{Modification, ModificationKey};
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

/// Identity keys of modifications already handed out for a response.
pub type SeenKeys = HashSet<ModificationKey>;

/// How a candidate starting at `{` resolved.
#[derive(Debug)]
enum Candidate {
    /// A complete object of this many bytes.
    Complete(usize, Value),
    /// Valid so far but cut off.
    Incomplete,
    Invalid,
}

fn parse_candidate(text: &str) -> Candidate {
    let mut values = serde_json::Deserializer::from_str(text).into_iter::<Value>();
    match values.next() {
        Some(Ok(value)) => Candidate::Complete(values.byte_offset(), value),
        Some(Err(e)) if e.is_eof() => Candidate::Incomplete,
        Some(Err(_)) | None => Candidate::Invalid,
    }
}

/// A balanced block that parsed as JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct DataBlock {
    /// Byte offset of the opening brace in the buffer.
    pub start: usize,
    /// Byte offset one past the closing brace.
    pub end: usize,
    pub text: String,
    /// Records decoded from this block, duplicates included.
    pub accepted: usize,
    /// Records dropped for missing or invalid fields.
    pub rejected: usize,
}

/// Result of one extraction pass.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Modifications not seen before, in buffer order.
    pub modifications: Vec<Modification>,
    /// The input seen set plus the keys of `modifications`.
    pub seen: SeenKeys,
    /// Blocks completed during this pass, in buffer order.
    pub blocks: Vec<DataBlock>,
    /// Records dropped during this pass.
    pub rejected: usize,
}

/// Incremental extractor for one response buffer.
#[derive(Debug, Clone, Default)]
pub struct ModificationExtractor {
    /// Where the next candidate search starts.
    cursor: usize,
    /// Start of a candidate still waiting for its closing brace.
    pending: Option<usize>,
}

impl ModificationExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer offset of the unfinished block, if one is in flight.
    pub fn pending(&self) -> Option<usize> {
        self.pending
    }

    /// Scan whatever the buffer gained since the last call and decode the
    /// blocks that completed.
    pub fn extract(&mut self, buffer: &str, seen: &SeenKeys) -> Extraction {
        if buffer.len() < self.cursor || !buffer.is_char_boundary(self.cursor) {
            debug!(target: "coursegen::extractor", "Buffer shrank below scanned offset, rescanning");
            *self = Self::new();
        }

        let mut extraction = Extraction {
            seen: seen.clone(),
            ..Extraction::default()
        };

        let mut pos = self.cursor;
        self.pending = None;
        while let Some(found) = buffer[pos..].find('{') {
            let start = pos + found;
            match parse_candidate(&buffer[start..]) {
                Candidate::Complete(len, value) => {
                    let end = start + len;
                    decode_block(&mut extraction, start, &buffer[start..end], value);
                    pos = end;
                }
                Candidate::Incomplete => {
                    self.pending = Some(start);
                    break;
                }
                Candidate::Invalid => {
                    debug!(target: "coursegen::extractor", "Brace at byte {} does not open a data block", start);
                    pos = start + 1;
                }
            }
        }
        self.cursor = self.pending.unwrap_or(buffer.len());

        extraction
    }
}

/// Extract from a whole buffer with a fresh scanner.
pub fn extract(buffer: &str, seen: &SeenKeys) -> Extraction {
    ModificationExtractor::new().extract(buffer, seen)
}

/// Decode a parsed block's records into the extraction.
fn decode_block(extraction: &mut Extraction, start: usize, text: &str, value: Value) {
    let mut block = DataBlock {
        start,
        end: start + text.len(),
        text: text.to_string(),
        accepted: 0,
        rejected: 0,
    };

    for record in &edit_records(value) {
        let modification = match Modification::decode(record) {
            Ok(m) => m,
            Err(e) => {
                debug!(target: "coursegen::extractor", "Dropping edit record: {}", e);
                block.rejected += 1;
                continue;
            }
        };
        block.accepted += 1;

        let Some(key) = modification.key() else {
            block.rejected += 1;
            continue;
        };
        if extraction.seen.insert(key) {
            extraction.modifications.push(modification);
        } else {
            debug!(target: "coursegen::extractor", "Skipping already seen modification");
        }
    }

    extraction.rejected += block.rejected;
    extraction.blocks.push(block);
}

/// Edit records carried by a parsed object (possibly none).
fn edit_records(value: Value) -> Vec<Value> {
    let Value::Object(mut object) = value else {
        return Vec::new();
    };

    match object.remove("modifications") {
        Some(Value::Array(records)) => records,
        Some(single @ Value::Object(_)) => vec![single],
        Some(_) => Vec::new(),
        None if object.contains_key("action") => vec![Value::Object(object)],
        None => Vec::new(),
    }
}
