//! Coursegen server library - HTTP/WebSocket front end for the course pipeline.
//!
//! Routes, the events WebSocket and application state live here, separate
//! from main.rs, so the router can be driven from integration tests.

pub mod config;
pub mod events_ws;
pub mod logging;
pub mod routes;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Build the full application router.
pub fn app(state: Arc<state::AppState>) -> Router {
    let api_routes = Router::new()
        // Stream sources
        .route("/responses", get(routes::responses::list).post(routes::responses::begin))
        .route(
            "/responses/{id}",
            get(routes::responses::get).delete(routes::responses::forget),
        )
        .route("/responses/{id}/chunks", post(routes::responses::chunk))
        .route("/responses/{id}/complete", post(routes::responses::complete))
        .route("/responses/{id}/error", post(routes::responses::error))
        .route("/responses/{id}/sections", get(routes::responses::sections))
        // Shared state
        .route("/tree", get(routes::tree::get))
        .route("/tasks", get(routes::tasks::list))
        .route("/tasks/{id}/done", post(routes::tasks::mark_done))
        .route("/captures", get(routes::captures::list))
        .route("/health", get(routes::health));

    let ws_routes = Router::new().route("/events", get(events_ws::upgrade));

    Router::new()
        .nest("/api", api_routes)
        .nest("/ws", ws_routes)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
