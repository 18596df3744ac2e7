use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::hub::Hub;
use crate::protocol::{meeting_room, ServerMessage};
use crate::server::AppState;
use crate::transport::{ChannelTransport, Transport};

const CHANNEL_BUFFER_SIZE: usize = 32;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Meeting the connection collaborates on; maps to room `meeting_<id>`.
    pub meeting_id: Option<String>,
    pub user_id: Option<String>,
}

/// WebSocket upgrade handler
#[tracing::instrument(
    name = "ws.upgrade",
    skip(ws, state, query),
    fields(meeting_id = ?query.meeting_id, user_id = ?query.user_id)
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query))
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState, query: WsQuery) {
    let connection_start = std::time::Instant::now();
    let room_id = query.meeting_id.as_deref().map(meeting_room);

    // Outbound frames flow through a channel so the registry owns a plain
    // transport handle and only this task writes to the socket.
    let (tx, mut rx) = mpsc::channel::<String>(CHANNEL_BUFFER_SIZE);
    let transport: Arc<dyn Transport> = Arc::new(ChannelTransport::new(tx));

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Task for pumping hub messages out to the WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let connection_id = state.hub.connect(transport, query.user_id.clone(), room_id.clone()).await;

    tracing::info!(
        connection_id = %connection_id,
        user_id = ?query.user_id,
        room_id = ?room_id,
        "WebSocket connection established"
    );

    // Task for receiving frames from the WebSocket
    let hub = state.hub.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !process_frame(msg, &hub, connection_id).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(connection_id = %connection_id, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
        }
        _ = recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
        }
    }

    state.hub.disconnect(connection_id).await;

    tracing::info!(
        connection_id = %connection_id,
        duration_secs = connection_start.elapsed().as_secs_f64(),
        "WebSocket connection closed"
    );
}

/// Process a received WebSocket frame.
/// Returns false if the connection should be closed.
async fn process_frame(msg: Message, hub: &Hub, connection_id: Uuid) -> bool {
    match msg {
        Message::Text(text) => {
            hub.handle_message(connection_id, &text).await;
            true
        }
        Message::Binary(_) => {
            let _ = hub
                .send(connection_id, ServerMessage::error("binary frames are not supported"))
                .await;
            true
        }
        Message::Ping(_) | Message::Pong(_) => {
            // Axum answers pings itself; transport-level traffic still counts
            // as liveness.
            hub.touch(connection_id).await;
            true
        }
        Message::Close(_) => {
            tracing::debug!(connection_id = %connection_id, "Received close frame");
            false
        }
    }
}
