//! Todo tasks tracking which tree paths have been materialized.

use crate::content::NodeType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tracked unit of expected tree-construction work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoTask {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub task_type: NodeType,
    /// Tree path that completes this task once it exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TodoTask {
    /// Create a pending task.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        task_type: NodeType,
        path: Option<String>,
    ) -> Self {
        Self {
            id: format!("task-{}", Uuid::new_v4()),
            title: title.into(),
            description: description.into(),
            task_type,
            path,
            completed: false,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Mark the task complete. Returns false if it already was.
    pub fn complete(&mut self, at: DateTime<Utc>) -> bool {
        if self.completed {
            return false;
        }
        self.completed = true;
        self.completed_at = Some(at);
        true
    }

    /// Whether two tasks describe the same work.
    pub fn same_work(&self, other: &TodoTask) -> bool {
        self.task_type == other.task_type && self.path == other.path && self.title == other.title
    }
}
