//! WebSocket forwarding pipeline events to dashboards.

use crate::state::AppState;
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

/// Handler for the events WebSocket upgrade.
pub async fn upgrade(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| async move {
        if let Err(e) = handle_events_websocket(socket, state).await {
            tracing::error!(target: "coursegen::ws", "Events WebSocket error: {}", e);
        }
    })
}

/// Forward every pipeline event to the client as JSON until either side
/// goes away.
pub async fn handle_events_websocket(socket: WebSocket, state: Arc<AppState>) -> Result<()> {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut events = BroadcastStream::new(state.pipeline.subscribe());

    tracing::info!(target: "coursegen::ws", "Events WebSocket client connected");

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let event = match event {
                Ok(event) => event,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(target: "coursegen::ws", "Events client lagging, {} event(s) skipped", skipped);
                    continue;
                }
            };

            let json = match serde_json::to_string(&event) {
                Ok(j) => j,
                Err(e) => {
                    tracing::warn!(target: "coursegen::ws", "Failed to encode event: {}", e);
                    continue;
                }
            };
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                tracing::debug!(target: "coursegen::ws", "Events client disconnected");
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Ping(_) => {
                    // Pong is handled automatically by axum
                    tracing::trace!(target: "coursegen::ws", "Received ping from events client");
                }
                Message::Close(_) => {
                    tracing::debug!(target: "coursegen::ws", "Events client closed connection");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    tracing::info!(target: "coursegen::ws", "Events WebSocket client disconnected");
    Ok(())
}
