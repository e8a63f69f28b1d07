//! Capture listing route.

use crate::state::AppState;
use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Serialize)]
pub struct CaptureSummary {
    pub id: Uuid,
    pub timestamp: u64,
    pub model: String,
    pub chunks: usize,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct CaptureListResponse {
    pub enabled: bool,
    pub captures: Vec<CaptureSummary>,
}

pub async fn list(State(state): State<Arc<AppState>>) -> Json<CaptureListResponse> {
    let captures = state
        .captures
        .captures()
        .await
        .into_iter()
        .map(|c| CaptureSummary {
            id: c.id,
            timestamp: c.timestamp,
            model: c.model,
            chunks: c.chunks.len(),
            duration_ms: c.duration_ms,
            error: c.error,
        })
        .collect();

    Json(CaptureListResponse {
        enabled: state.captures.config().enabled,
        captures,
    })
}
