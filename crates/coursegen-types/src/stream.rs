//! Response stream lifecycle and pipeline event types.

use crate::content::ContentTree;
use crate::modification::ModificationKey;
use crate::section::Section;
use crate::task::TodoTask;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// What the generator is currently doing, as announced by stream markers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    #[default]
    Idle,
    Thinking,
    Generating,
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProcessingStatus::Idle => "idle",
            ProcessingStatus::Thinking => "thinking",
            ProcessingStatus::Generating => "generating",
        })
    }
}

/// Lifecycle of one response stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponsePhase {
    /// Fragments are still arriving.
    #[default]
    Receiving,
    /// The stream signalled completion.
    Complete,
    /// The transport failed.
    Error,
    /// A newer response replaced this one; late fragments are ignored.
    Superseded,
}

impl ResponsePhase {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ResponsePhase::Receiving)
    }
}

impl fmt::Display for ResponsePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResponsePhase::Receiving => "receiving",
            ResponsePhase::Complete => "complete",
            ResponsePhase::Error => "error",
            ResponsePhase::Superseded => "superseded",
        })
    }
}

/// One signal from a stream source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "text", rename_all = "snake_case")]
pub enum StreamSignal {
    Chunk(String),
    Complete(String),
    Error(String),
}

/// Events broadcast to pipeline subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    ResponseStarted {
        response_id: Uuid,
        supersedes: Option<Uuid>,
    },
    StatusChanged {
        response_id: Uuid,
        status: ProcessingStatus,
    },
    Section {
        response_id: Uuid,
        section: Section,
    },
    TreeUpdated {
        response_id: Uuid,
        revision: u64,
        applied: Vec<ModificationKey>,
        tree: Arc<ContentTree>,
    },
    TasksUpdated {
        tasks: Vec<TodoTask>,
    },
    ResponseComplete {
        response_id: Uuid,
    },
    ResponseFailed {
        response_id: Uuid,
        message: String,
    },
    ResponseSuperseded {
        response_id: Uuid,
        by: Uuid,
    },
}

impl PipelineEvent {
    /// Response this event concerns, if any.
    pub fn response_id(&self) -> Option<Uuid> {
        match self {
            PipelineEvent::ResponseStarted { response_id, .. }
            | PipelineEvent::StatusChanged { response_id, .. }
            | PipelineEvent::Section { response_id, .. }
            | PipelineEvent::TreeUpdated { response_id, .. }
            | PipelineEvent::ResponseComplete { response_id }
            | PipelineEvent::ResponseFailed { response_id, .. }
            | PipelineEvent::ResponseSuperseded { response_id, .. } => Some(*response_id),
            PipelineEvent::TasksUpdated { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_phases() {
        assert!(!ResponsePhase::Receiving.is_terminal());
        assert!(ResponsePhase::Complete.is_terminal());
        assert!(ResponsePhase::Error.is_terminal());
        assert!(ResponsePhase::Superseded.is_terminal());
    }

    #[test]
    fn test_stream_signal_wire_format() {
        let signal: StreamSignal =
            serde_json::from_str(r#"{"type":"chunk","text":"hello"}"#).unwrap();
        assert_eq!(signal, StreamSignal::Chunk("hello".to_string()));
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let id = Uuid::new_v4();
        let event = PipelineEvent::StatusChanged {
            response_id: id,
            status: ProcessingStatus::Thinking,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "status_changed");
        assert_eq!(json["status"], "thinking");
        assert_eq!(event.response_id(), Some(id));
    }
}
