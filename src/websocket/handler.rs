//! WebSocket Handler
//!
//! Handles WebSocket upgrade requests on a room address and manages the
//! connection lifecycle: register, join, relay frames, leave, unregister.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::messages::{ClientMessage, ServerMessage};
use super::registry::ConnectionRegistry;
use crate::api::{ApiError, ApiResult, AppState};
use crate::session::{CollabHub, HubResult};

/// WebSocket upgrade handler for `/ws/collab/:room_id/`
///
/// Rejects blank room ids before upgrading.
pub async fn websocket_handler(
    Path(room_id): Path<String>,
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> ApiResult<Response> {
    let room_id = validate_room_id(&room_id)?;

    let hub = Arc::clone(&state.hub);
    let registry = Arc::clone(&state.registry);
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, room_id, hub, registry)))
}

/// Trim the room id taken from the path, rejecting blank ids
pub fn validate_room_id(raw: &str) -> ApiResult<String> {
    let room_id = raw.trim();
    if room_id.is_empty() {
        return Err(ApiError::Validation("Room id must not be empty".to_string()));
    }
    Ok(room_id.to_string())
}

/// Handle an established WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    room_id: String,
    hub: Arc<CollabHub>,
    registry: Arc<ConnectionRegistry>,
) {
    let (mut sender, mut receiver) = socket.split();

    // Create channel for sending messages to this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let connection_id = match registry.register(tx) {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(room_id = %room_id, error = %e, "Failed to register WebSocket connection");
            if let Some(text) = encode(&ServerMessage::error(e.to_string())) {
                let _ = sender.send(Message::Text(text)).await;
            }
            return;
        }
    };

    // The replay is queued on the channel and flushed once the send task starts
    if let Err(frame) = join_room(&hub, &registry, &connection_id, &room_id) {
        if let Some(text) = encode(&frame) {
            let _ = sender.send(Message::Text(text)).await;
        }
        let _ = sender.send(Message::Close(None)).await;
        return;
    }

    let conn_id_for_send = connection_id.clone();

    // Task to forward messages from channel to WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let Some(text) = encode(&msg) else {
                continue;
            };
            if sender.send(Message::Text(text)).await.is_err() {
                tracing::debug!(
                    connection_id = %conn_id_for_send,
                    "WebSocket send failed, closing connection"
                );
                break;
            }
        }
    });

    let hub_for_recv = Arc::clone(&hub);
    let registry_for_recv = Arc::clone(&registry);
    let conn_id_for_recv = connection_id.clone();
    let room_for_recv = room_id.clone();

    // Task to receive messages from WebSocket and handle them
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(msg) => {
                    if !handle_ws_message(
                        &hub_for_recv,
                        &registry_for_recv,
                        &conn_id_for_recv,
                        &room_for_recv,
                        msg,
                    ) {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        connection_id = %conn_id_for_recv,
                        error = %e,
                        "WebSocket receive error"
                    );
                    break;
                }
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    leave_room(&hub, &registry, &connection_id, &room_id);
}

/// Join the room for a registered connection.
///
/// A rejected join unregisters the connection and returns the error frame
/// to send before closing.
fn join_room(
    hub: &CollabHub,
    registry: &ConnectionRegistry,
    connection_id: &str,
    room_id: &str,
) -> Result<(), ServerMessage> {
    hub.on_new_connection(connection_id, room_id).map_err(|e| {
        tracing::warn!(
            connection_id = %connection_id,
            room_id = %room_id,
            error = %e,
            "Join rejected"
        );
        registry.unregister(connection_id);
        ServerMessage::error(e.to_string())
    })
}

/// Leave the room, then unregister
fn leave_room(hub: &CollabHub, registry: &ConnectionRegistry, connection_id: &str, room_id: &str) {
    if let Err(e) = hub.on_connection_end(connection_id, room_id) {
        tracing::warn!(
            connection_id = %connection_id,
            room_id = %room_id,
            error = %e,
            "Failed to leave room"
        );
    }
    registry.unregister(connection_id);
}

/// Handle a received WebSocket message
///
/// Returns false if the connection should be closed.
fn handle_ws_message(
    hub: &CollabHub,
    registry: &ConnectionRegistry,
    connection_id: &str,
    room_id: &str,
    message: Message,
) -> bool {
    match message {
        Message::Text(text) => {
            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => {
                    if let Err(e) = apply_client_message(hub, connection_id, room_id, client_msg) {
                        tracing::warn!(
                            connection_id = %connection_id,
                            room_id = %room_id,
                            error = %e,
                            "Client message rejected"
                        );
                        reply_error(registry, connection_id, e.to_string());
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        connection_id = %connection_id,
                        error = %e,
                        text = %text,
                        "Invalid client message"
                    );
                    // Send error but keep connection open
                    reply_error(registry, connection_id, format!("Invalid message format: {}", e));
                }
            }
            true
        }
        Message::Binary(_) => {
            reply_error(registry, connection_id, "Binary messages not supported");
            true
        }
        // Axum answers pings itself
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            tracing::debug!(connection_id = %connection_id, "Client requested close");
            false
        }
    }
}

/// Route a decoded client message to the matching hub handler
pub fn apply_client_message(
    hub: &CollabHub,
    connection_id: &str,
    room_id: &str,
    message: ClientMessage,
) -> HubResult<()> {
    match message {
        ClientMessage::SceneUpdate {
            sketch_id,
            sketch_data,
        } => hub.on_scene_update(connection_id, room_id, &sketch_id, sketch_data),
        ClientMessage::PageUpdate {
            sketch_id,
            page_name,
        } => hub.on_page_update(connection_id, room_id, &sketch_id, page_name),
        ClientMessage::CollaboratorJoin { user_id, username } => {
            hub.on_collaborator_join(connection_id, room_id, &user_id, &username)
        }
        ClientMessage::CollaboratorPointer {
            user_id,
            pointer,
            page_id,
        } => hub.on_collaborator_pointer(connection_id, room_id, &user_id, pointer, page_id),
    }
}

fn reply_error(registry: &ConnectionRegistry, connection_id: &str, message: impl Into<String>) {
    if let Err(e) = registry.send_to(connection_id, ServerMessage::error(message)) {
        tracing::debug!(connection_id = %connection_id, error = %e, "Failed to send error frame");
    }
}

fn encode(message: &ServerMessage) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize message");
            None
        }
    }
}
