//! Todo task routes.

use super::api_error;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use coursegen_types::TodoTask;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Serialize)]
pub struct TaskListResponse {
    pub tasks: Vec<TodoTask>,
    pub pending: usize,
}

pub async fn list(State(state): State<Arc<AppState>>) -> Json<TaskListResponse> {
    let tasks = state.pipeline.tasks().await;
    let pending = tasks.iter().filter(|t| !t.completed).count();
    Json(TaskListResponse { tasks, pending })
}

#[derive(Serialize)]
pub struct MarkDoneResponse {
    pub task_id: String,
    /// False when the task was already complete
    pub changed: bool,
}

pub async fn mark_done(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MarkDoneResponse>, (StatusCode, String)> {
    let changed = state.pipeline.mark_task_done(&id).await.map_err(api_error)?;
    if changed {
        info!(target: "coursegen::api", "Task {} marked done", id);
    }
    Ok(Json(MarkDoneResponse { task_id: id, changed }))
}
