//! HTTP route handlers.

pub mod captures;
pub mod responses;
pub mod tasks;
pub mod tree;

use axum::{http::StatusCode, Json};
use coursegen_core::CoursegenError;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Map a pipeline error onto a status code and message.
pub fn api_error(err: CoursegenError) -> (StatusCode, String) {
    let status = match &err {
        CoursegenError::ResponseNotFound(_) | CoursegenError::TaskNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        CoursegenError::ResponseAlreadyExists(_)
        | CoursegenError::ResponseActive(_)
        | CoursegenError::ResponseClosed { .. }
        | CoursegenError::ResponseSuperseded { .. } => StatusCode::CONFLICT,
        CoursegenError::Transport(_) => StatusCode::BAD_GATEWAY,
        CoursegenError::Capture(_) | CoursegenError::IoError(_) | CoursegenError::JsonError(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status.is_server_error() {
        tracing::error!(target: "coursegen::api", "{}", err);
    } else {
        tracing::debug!(target: "coursegen::api", "Request rejected: {}", err);
    }
    (status, err.to_string())
}
