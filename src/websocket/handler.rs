use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::connection_manager::{ConnectionHandle, ConnectionManager};
use crate::metrics::{PresenceMetrics, WS_CONNECTIONS_CLOSED, WS_CONNECTIONS_OPENED, WS_CONNECTION_DURATION};
use crate::server::AppState;

use super::dispatch::dispatch_inbound;
use super::message::{OutboundMessage, ServerMessage};

#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    /// Authenticate right after accept, same as an `authenticate` message
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

/// WebSocket upgrade handler
#[tracing::instrument(
    name = "ws.upgrade",
    skip(ws, state, query),
    fields(has_user_id = query.user_id.is_some())
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.user_id))
}

/// Drive an established WebSocket connection until it ends
#[tracing::instrument(name = "ws.connection", skip_all, fields(otel.kind = "server"))]
async fn handle_socket(socket: WebSocket, state: AppState, user_id: Option<String>) {
    let connection_start = Instant::now();
    let manager = state.connection_manager.clone();

    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(state.settings.websocket.channel_buffer_size);
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // The writer must be draining before accept queues the greeting
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let frame = match msg.to_json() {
                Ok(Some(text)) => Message::Text(text.into()),
                Ok(None) => Message::Ping(Bytes::new()),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize message");
                    continue;
                }
            };

            if ws_sender.send(frame).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    let Some(handle) = manager.accept(tx) else {
        send_task.abort();
        return;
    };
    let connection_id = handle.id;
    WS_CONNECTIONS_OPENED.inc();

    if let Some(user_id) = user_id {
        let _ = manager.authenticate(connection_id, &user_id);
    }
    PresenceMetrics::update(&manager.stats());

    tracing::info!(connection_id = %connection_id, "WebSocket connection established");

    let recv_manager = manager.clone();
    let recv_handle = handle.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !process_message(msg, &recv_manager, &recv_handle) {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(connection_id = %recv_handle.id, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
        }
        _ = &mut recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
        }
        _ = handle.terminated() => {
            tracing::debug!(connection_id = %connection_id, "Connection terminated by server");
        }
    }
    send_task.abort();
    recv_task.abort();

    manager.disconnect(connection_id);
    PresenceMetrics::update(&manager.stats());

    WS_CONNECTIONS_CLOSED.inc();
    let duration = connection_start.elapsed().as_secs_f64();
    WS_CONNECTION_DURATION.observe(duration);

    tracing::info!(
        connection_id = %connection_id,
        duration_secs = duration,
        "WebSocket connection closed"
    );
}

/// Process a received WebSocket frame.
/// Returns false if the connection should be closed.
fn process_message(msg: Message, manager: &ConnectionManager, handle: &Arc<ConnectionHandle>) -> bool {
    match msg {
        Message::Text(text) => {
            dispatch_inbound(manager, handle, text.as_str());
            true
        }
        Message::Binary(_) => {
            let _ = handle.send(ServerMessage::error("Binary messages are not supported"));
            true
        }
        // axum answers pings itself
        Message::Ping(_) | Message::Pong(_) => {
            handle.mark_alive();
            true
        }
        Message::Close(_) => {
            tracing::debug!(connection_id = %handle.id, "Received close frame");
            false
        }
    }
}
