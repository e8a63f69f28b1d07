//! Response stream routes: the push interface for stream sources.

use super::api_error;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use coursegen_core::{BeginResponse, ChunkOutcome, CoursePipeline, ResponseSummary};
use coursegen_types::Section;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

#[derive(Debug, Default, Deserialize)]
pub struct BeginRequest {
    /// Client-chosen id; generated when absent
    #[serde(default)]
    pub id: Option<Uuid>,
    /// Response this one replaces
    #[serde(default)]
    pub supersedes: Option<Uuid>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BeginResponseBody {
    pub response_id: Uuid,
    pub ws_url: String,
}

pub async fn begin(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BeginRequest>,
) -> Result<(StatusCode, Json<BeginResponseBody>), (StatusCode, String)> {
    let id = req.id.unwrap_or_else(Uuid::new_v4);
    let mut request = BeginResponse::new(id);
    request.supersedes = req.supersedes;
    request.prompt = req.prompt;
    request.model = req.model;

    state.pipeline.begin_response(request).await.map_err(api_error)?;
    info!(target: "coursegen::api", "Began response {}", id);

    spawn_expiry(Arc::clone(&state.pipeline), id, state.config.stream_timeout());

    Ok((
        StatusCode::CREATED,
        Json(BeginResponseBody {
            response_id: id,
            ws_url: "/ws/events".to_string(),
        }),
    ))
}

/// Fail the response if it is still open once `limit` has passed.
fn spawn_expiry(pipeline: Arc<CoursePipeline>, id: Uuid, limit: Duration) {
    if limit.is_zero() {
        return;
    }
    tokio::spawn(async move {
        tokio::time::sleep(limit).await;
        let message = format!("stream timed out after {}s", limit.as_secs());
        match pipeline.expire(id, &message).await {
            Ok(true) => tracing::warn!(target: "coursegen::api", "Response {} expired", id),
            Ok(false) => {}
            Err(e) => tracing::debug!(target: "coursegen::api", "Expiry of {} skipped: {}", id, e),
        }
    });
}

pub async fn list(State(state): State<Arc<AppState>>) -> Json<Vec<ResponseSummary>> {
    Json(state.pipeline.responses().await)
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<ResponseSummary> {
    state
        .pipeline
        .response(id)
        .await
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Response not found: {}", id)))
}

/// Drop an ended response and its sections.
pub async fn forget(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    state.pipeline.forget_response(id).await.map_err(api_error)?;
    info!(target: "coursegen::api", "Forgot response {}", id);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ChunkRequest {
    pub text: String,
}

pub async fn chunk(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<ChunkRequest>,
) -> ApiResult<ChunkOutcome> {
    let outcome = state.pipeline.on_chunk(id, &req.text).await.map_err(api_error)?;
    Ok(Json(outcome))
}

#[derive(Debug, Default, Deserialize)]
pub struct CompleteRequest {
    /// Full response text, if the source has it
    #[serde(default)]
    pub text: String,
}

pub async fn complete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<CompleteRequest>,
) -> ApiResult<ChunkOutcome> {
    let outcome = state.pipeline.on_complete(id, &req.text).await.map_err(api_error)?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct ErrorRequest {
    pub message: String,
}

pub async fn error(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<ErrorRequest>,
) -> ApiResult<ResponseSummary> {
    state.pipeline.on_error(id, &req.message).await.map_err(api_error)?;
    get(State(state), Path(id)).await
}

#[derive(Debug, Default, Deserialize)]
pub struct SectionsQuery {
    #[serde(default)]
    pub since: usize,
}

#[derive(Debug, Serialize)]
pub struct SectionsResponse {
    pub sections: Vec<Section>,
    /// Offset to poll from next time
    pub next: usize,
}

pub async fn sections(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<SectionsQuery>,
) -> ApiResult<SectionsResponse> {
    let sections = state
        .pipeline
        .sections_since(id, query.since)
        .await
        .map_err(api_error)?;
    let next = query.since + sections.len();
    Ok(Json(SectionsResponse { sections, next }))
}
