//! Error types for Coursegen.

use coursegen_types::ResponsePhase;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum CoursegenError {
    #[error("Response not found: {0}")]
    ResponseNotFound(Uuid),

    #[error("Response already exists: {0}")]
    ResponseAlreadyExists(Uuid),

    #[error("Response {id} is closed ({phase})")]
    ResponseClosed { id: Uuid, phase: ResponsePhase },

    #[error("Response {0} is still receiving")]
    ResponseActive(Uuid),

    #[error("Response {id} was superseded by {by}")]
    ResponseSuperseded { id: Uuid, by: Uuid },

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}
