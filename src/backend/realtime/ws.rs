//! WebSocket Transport
//!
//! Upgrade handling and the per-connection lifecycle. Identity arrives in
//! the upgrade query string (the Discord activity client already holds an
//! authenticated profile); there is no in-band auth handshake.
//!
//! Connection sequence:
//!
//! 1. upgrade, split the socket
//! 2. spawn the writer pump that drains this connection's mpsc queue
//! 3. register with the fan-out registry (peers hear `user_joined`)
//! 4. queue the full room snapshot
//! 5. read loop: parse each text frame and dispatch to the session layer
//! 6. on close or error: unregister (peers hear `user_left`)
//!
//! Registration happens before the snapshot is assembled so an op applied
//! in between cannot be missed: it lands on the connection's queue as a
//! broadcast and again inside the snapshot, and ops are idempotent by id.
//! The cost of the other order would be a silent gap until the next
//! document switch.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::backend::server::AppState;
use crate::backend::session;
use crate::shared::{UserProfile, WsMessage};

/// Identity and room routing, from the upgrade query string.
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub channel_id: String,
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub discriminator: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// GET /ws?channel_id=...&user_id=...&username=...
pub async fn handle_ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| client_session(state, params, socket))
}

async fn client_session(state: AppState, params: ConnectParams, socket: WebSocket) {
    let conn_id = Uuid::new_v4();
    let channel_id = params.channel_id;
    let user = UserProfile {
        id: params.user_id,
        username: params.username,
        discriminator: params.discriminator.unwrap_or_default(),
        avatar: params.avatar,
    };

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();

    // Writer pump: the only task touching the socket's send half. Broadcasts
    // from any thread become non-blocking queue pushes.
    let pump = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("[Realtime] Failed to serialize outbound frame: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Join the fan-out set first, then send the snapshot. A broadcast that
    // sneaks in between is at worst duplicated by the snapshot.
    state
        .registry
        .register(&channel_id, conn_id, user.clone(), tx.clone());
    let snapshot = state.rooms.snapshot(&channel_id).await;
    if tx.send(WsMessage::Snapshot { data: snapshot }).is_err() {
        state.registry.unregister(&channel_id, conn_id);
        pump.abort();
        return;
    }
    drop(tx);

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<WsMessage>(&text) {
                Ok(message) => {
                    session::handle_message(
                        &state.rooms,
                        &state.registry,
                        &channel_id,
                        conn_id,
                        &user,
                        message,
                    )
                    .await;
                }
                Err(e) => {
                    // Malformed frames are dropped, not fatal to the session.
                    tracing::warn!(
                        "[Realtime] Dropping malformed frame from {}: {}",
                        user.id,
                        e
                    );
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {} // ping/pong handled by axum, binary ignored
            Err(e) => {
                tracing::debug!("[Realtime] Socket error on connection {}: {}", conn_id, e);
                break;
            }
        }
    }

    state.registry.unregister(&channel_id, conn_id);
    pump.abort();
}
