// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! WebSocket relay endpoint.
//!
//! Each connection becomes one hub client. Text frames carry
//! [`ClientMessage`] envelopes; selections made by other members of the
//! client's rooms come back as [`ServerMessage::ElementSelected`].

use crate::routes::rooms::MAX_ROOM_ID_LEN;
use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use ifc_share_viewer::collab::{
    Channel, ChannelError, ClientMessage, HubClient, ServerMessage, LISTENER_CAPACITY,
};
use tokio::sync::mpsc;

/// GET /ws - Upgrade to the relay protocol.
pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let max = state.config.max_message_bytes;
    ws.max_message_size(max)
        .max_frame_size(max)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let client = state.hub.connect();
    let (tx, mut inbound) = mpsc::channel(LISTENER_CAPACITY);
    client.on(tx);
    let (mut sender, mut receiver) = socket.split();
    tracing::info!(client = client.id().0, "WebSocket connected");

    loop {
        tokio::select! {
            Some(event) = inbound.recv() => {
                if send(&mut sender, &ServerMessage::ElementSelected(event)).await.is_err() {
                    break;
                }
            }
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = handle_frame(&client, &state, &text).await {
                        if send(&mut sender, &reply).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(client = client.id().0, error = %e, "WebSocket error");
                    break;
                }
            }
        }
    }

    tracing::info!(client = client.id().0, "WebSocket disconnected");
}

async fn send(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    match serde_json::to_string(message) {
        Ok(text) => sender.send(Message::Text(text)).await,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode frame");
            Ok(())
        }
    }
}

/// Applies one text frame. Returns the reply to send back, if any.
pub(crate) async fn handle_frame(
    client: &HubClient,
    state: &AppState,
    text: &str,
) -> Option<ServerMessage> {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(client = client.id().0, error = %e, "Rejected frame");
            return Some(ServerMessage::Error {
                message: format!("invalid frame: {}", e),
            });
        }
    };

    match message {
        ClientMessage::JoinRoom(room) => {
            let room = if room.as_str().trim().is_empty() {
                state.config.default_room.clone()
            } else {
                room
            };
            if room.as_str().trim().is_empty() || room.as_str().len() > MAX_ROOM_ID_LEN {
                return Some(ServerMessage::Error {
                    message: format!("room id must be 1 to {} bytes", MAX_ROOM_ID_LEN),
                });
            }
            Some(match client.join(&room).await {
                Ok(()) => ServerMessage::Joined(room),
                Err(e) => error_reply(e),
            })
        }
        ClientMessage::LeaveRoom(room) => Some(match client.leave(&room).await {
            Ok(()) => ServerMessage::Left(room),
            Err(e) => error_reply(e),
        }),
        ClientMessage::ElementSelected(event) => match client.broadcast(event) {
            Ok(delivered) => {
                tracing::debug!(
                    client = client.id().0,
                    element = %event.element_id,
                    delivered,
                    "Selection relayed"
                );
                None
            }
            Err(e) => Some(error_reply(e)),
        },
    }
}

fn error_reply(error: ChannelError) -> ServerMessage {
    ServerMessage::Error {
        message: error.to_string(),
    }
}
