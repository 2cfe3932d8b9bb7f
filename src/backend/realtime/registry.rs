//! Connection Registry & Broadcaster
//!
//! Tracks live client connections per channel and fans state-changing
//! events out to peers. Each connection is represented by the unbounded
//! sender feeding its socket writer pump, so a broadcast is a non-blocking
//! push; the pump owns the actual socket I/O.
//!
//! # Presence and cursors
//!
//! Presence (join/leave) and cursor positions are purely ephemeral: cursors
//! are last-value-wins per user, never persisted, and dropped entirely on
//! disconnect.
//!
//! # Dead connections
//!
//! A send failure means the receiving pump is gone. Dead connections are
//! unregistered synchronously inside the broadcast loop so a single stale
//! socket cannot block delivery to the rest of the channel, and their
//! departure is announced to the remaining peers.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::shared::{UserProfile, WsMessage};

/// Opaque per-connection identity (one user may hold several).
pub type ConnectionId = Uuid;

/// The channel feeding one connection's socket writer pump.
pub type ClientSender = mpsc::UnboundedSender<WsMessage>;

/// A user's last known cursor position. Ephemeral relay state only.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
    pub color: String,
}

#[derive(Debug, Clone)]
struct ClientHandle {
    user: UserProfile,
    sender: ClientSender,
}

#[derive(Debug, Default)]
struct ChannelPeers {
    clients: HashMap<ConnectionId, ClientHandle>,
    cursors: HashMap<String, CursorPosition>,
}

/// Live-connection counters for the stats endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub active_channels: usize,
    pub active_connections: usize,
    pub tracked_cursors: usize,
}

/// Per-channel fan-out sets. Constructor-injected so tests can instantiate
/// isolated registries; there is no module-level singleton.
#[derive(Debug, Default)]
pub struct Registry {
    channels: Mutex<HashMap<String, ChannelPeers>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a channel's fan-out set and announce the join to
    /// every other connection. The caller is responsible for sending the
    /// new connection its state snapshot first.
    pub fn register(
        &self,
        channel_id: &str,
        conn_id: ConnectionId,
        user: UserProfile,
        sender: ClientSender,
    ) {
        let mut channels = self.channels.lock().unwrap();
        let peers = channels.entry(channel_id.to_string()).or_default();
        let joined = WsMessage::UserJoined { user: user.clone() };
        peers.clients.insert(conn_id, ClientHandle { user, sender });

        let dead = deliver(peers, &joined, Some(conn_id));
        reap(peers, dead);
        tracing::info!(
            "[Realtime] Connection {} joined channel {} ({} connected)",
            conn_id,
            channel_id,
            peers.clients.len()
        );
    }

    /// Remove a connection, announce the departure to the remainder, and
    /// discard the user's last known cursor.
    pub fn unregister(&self, channel_id: &str, conn_id: ConnectionId) {
        let mut channels = self.channels.lock().unwrap();
        let Some(peers) = channels.get_mut(channel_id) else {
            return;
        };
        let Some(handle) = peers.clients.remove(&conn_id) else {
            return;
        };

        let user_id = handle.user.id;
        if !peers.clients.values().any(|c| c.user.id == user_id) {
            peers.cursors.remove(&user_id);
        }

        let left = WsMessage::UserLeft {
            user_id: user_id.clone(),
        };
        let dead = deliver(peers, &left, None);
        reap(peers, dead);
        tracing::info!(
            "[Realtime] Connection {} left channel {} ({} connected)",
            conn_id,
            channel_id,
            peers.clients.len()
        );

        if peers.clients.is_empty() {
            channels.remove(channel_id);
        }
    }

    /// Fan a message out to every live connection in a channel except the
    /// optional excluded one (used so an author does not receive an echo of
    /// an op it already applied optimistically).
    pub fn broadcast(&self, channel_id: &str, message: &WsMessage, exclude: Option<ConnectionId>) {
        let mut channels = self.channels.lock().unwrap();
        let Some(peers) = channels.get_mut(channel_id) else {
            return;
        };
        let dead = deliver(peers, message, exclude);
        reap(peers, dead);
        if peers.clients.is_empty() {
            channels.remove(channel_id);
        }
    }

    /// Fan a message out to every connection in every channel. Used for
    /// library-wide signals such as `pdf_deleted`.
    pub fn broadcast_all(&self, message: &WsMessage) {
        let mut channels = self.channels.lock().unwrap();
        for peers in channels.values_mut() {
            let dead = deliver(peers, message, None);
            reap(peers, dead);
        }
        channels.retain(|_, peers| !peers.clients.is_empty());
    }

    /// Record a user's cursor, last-value-wins. Never persisted.
    pub fn update_cursor(&self, channel_id: &str, user_id: &str, position: CursorPosition) {
        let mut channels = self.channels.lock().unwrap();
        if let Some(peers) = channels.get_mut(channel_id) {
            peers.cursors.insert(user_id.to_string(), position);
        }
    }

    pub fn stats(&self) -> RegistryStats {
        let channels = self.channels.lock().unwrap();
        RegistryStats {
            active_channels: channels.len(),
            active_connections: channels.values().map(|p| p.clients.len()).sum(),
            tracked_cursors: channels.values().map(|p| p.cursors.len()).sum(),
        }
    }
}

/// Send to every client except `exclude`; return the connections whose
/// pump has gone away.
fn deliver(
    peers: &ChannelPeers,
    message: &WsMessage,
    exclude: Option<ConnectionId>,
) -> Vec<ConnectionId> {
    let mut dead = Vec::new();
    for (conn_id, handle) in &peers.clients {
        if Some(*conn_id) == exclude {
            continue;
        }
        if handle.sender.send(message.clone()).is_err() {
            dead.push(*conn_id);
        }
    }
    dead
}

/// Unregister dead connections found during a delivery pass and announce
/// their departure to whoever is left. Further send failures here are
/// ignored; the next delivery pass reaps them.
fn reap(peers: &mut ChannelPeers, dead: Vec<ConnectionId>) {
    for conn_id in dead {
        let Some(handle) = peers.clients.remove(&conn_id) else {
            continue;
        };
        tracing::warn!("[Realtime] Reaped dead connection {}", conn_id);

        let user_id = handle.user.id;
        if !peers.clients.values().any(|c| c.user.id == user_id) {
            peers.cursors.remove(&user_id);
        }
        let left = WsMessage::UserLeft {
            user_id: user_id.clone(),
        };
        for other in peers.clients.values() {
            let _ = other.sender.send(left.clone());
        }
    }
}
