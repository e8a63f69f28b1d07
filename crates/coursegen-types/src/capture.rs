//! Replayable record of one response stream.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Everything needed to push a captured stream through the pipeline again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseCapture {
    pub id: Uuid,
    /// Capture start (ms since Unix epoch)
    pub timestamp: u64,
    #[serde(default)]
    pub user_prompt: String,
    #[serde(default)]
    pub model: String,
    pub chunks: Vec<String>,
    #[serde(default)]
    pub full_response: String,
    #[serde(default)]
    pub duration_ms: u64,
    /// Transport error, when the stream ended in one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseCapture {
    /// Concatenation of all captured chunks.
    pub fn joined_chunks(&self) -> String {
        self.chunks.concat()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_wire_format() {
        let json = r#"{
            "id": "00000000-0000-0000-0000-000000000001",
            "timestamp": 1700000000000,
            "userPrompt": "Build a Rust course",
            "model": "haiku",
            "chunks": ["[Thinking...] ", "planning"],
            "fullResponse": "[Thinking...] planning",
            "durationMs": 1200
        }"#;
        let capture: ResponseCapture = serde_json::from_str(json).unwrap();
        assert_eq!(capture.chunks.len(), 2);
        assert_eq!(capture.joined_chunks(), capture.full_response);
        assert!(capture.error.is_none());
    }
}
