//! Content tree route.

use crate::state::AppState;
use axum::{extract::State, Json};
use coursegen_types::ContentTree;
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub struct TreeResponse {
    pub revision: u64,
    pub node_count: usize,
    pub tree: Arc<ContentTree>,
}

pub async fn get(State(state): State<Arc<AppState>>) -> Json<TreeResponse> {
    let (tree, revision) = state.pipeline.tree_snapshot().await;
    Json(TreeResponse {
        revision,
        node_count: tree.node_count(),
        tree,
    })
}
