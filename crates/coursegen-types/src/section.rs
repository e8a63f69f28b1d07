//! Classified, renderable units of stream output.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// What a section holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SectionKind {
    #[serde(rename = "thinking")]
    Thinking,
    #[serde(rename = "generating")]
    Generating,
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "structured-data", alias = "json", alias = "structured")]
    StructuredData,
}

impl SectionKind {
    pub fn slug(self) -> &'static str {
        match self {
            SectionKind::Thinking => "thinking",
            SectionKind::Generating => "generating",
            SectionKind::Text => "text",
            SectionKind::StructuredData => "structured-data",
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// A section that has been classified but not yet stamped into a response log.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionDraft {
    pub kind: SectionKind,
    pub content: String,
    pub metadata: Option<Value>,
}

impl SectionDraft {
    pub fn new(kind: SectionKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// An emitted section. Immutable once appended to a response log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    /// Unique section identifier
    pub id: String,
    /// Response this section belongs to
    pub response_id: Uuid,
    #[serde(rename = "type")]
    pub kind: SectionKind,
    pub content: String,
    /// Emission time (ms since Unix epoch)
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Section {
    /// Stamp a draft with an id and the current time.
    pub fn from_draft(response_id: Uuid, draft: SectionDraft) -> Self {
        Self {
            id: format!("{}-{}", draft.kind.slug(), Uuid::new_v4()),
            response_id,
            kind: draft.kind,
            content: draft.content,
            timestamp: now_ms(),
            metadata: draft.metadata,
        }
    }
}

/// Get current time in milliseconds since Unix epoch.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
