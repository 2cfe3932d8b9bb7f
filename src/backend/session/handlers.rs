//! Session Protocol Handlers
//!
//! The state-transition rules triggered by each inbound envelope. Each
//! channel is a little state machine with two states: `NoDocument`
//! (`current_pdf_id` is `None`) and `Viewing(pdf, page)`.
//!
//! - `set_pdf` moves between the two states, runs the flush/load sequence
//!   in the room cache, and broadcasts a full snapshot to every connection
//!   (clients replace their entire local state).
//! - annotation submissions require `Viewing`; in `NoDocument` they are
//!   rejected as a silent no-op, not an error.
//! - accepted ops are enriched with the authenticated author and a server
//!   timestamp, applied, then broadcast to all *other* connections; the
//!   originating client applies its own optimistic copy.
//!
//! # Atomicity
//!
//! The room's mutex is held across apply and broadcast, so any two
//! mutations on the same channel are applied and announced in the same
//! order everywhere. For a single connection, the reader loop dispatches
//! sequentially, so delivery order to peers equals submission order.

use crate::backend::realtime::{ConnectionId, CursorPosition, Registry};
use crate::backend::rooms::RoomManager;
use crate::shared::{
    DrawSubmit, SharedError, StickySubmit, TextSubmit, UserProfile, WsMessage,
};

/// Server timestamp for op enrichment, epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn validate_common(id: &str, page: u32) -> Result<(), SharedError> {
    if id.is_empty() {
        return Err(SharedError::validation("id", "id must not be empty"));
    }
    if page < 1 {
        return Err(SharedError::validation("page", "page must be >= 1"));
    }
    Ok(())
}

fn validate_draw(submit: &DrawSubmit) -> Result<(), SharedError> {
    validate_common(&submit.id, submit.page)?;
    if submit.path.len() < 2 {
        return Err(SharedError::validation(
            "path",
            "a committed stroke needs at least 2 points",
        ));
    }
    Ok(())
}

fn validate_text(submit: &TextSubmit) -> Result<(), SharedError> {
    validate_common(&submit.id, submit.page)
}

fn validate_sticky(submit: &StickySubmit) -> Result<(), SharedError> {
    validate_common(&submit.id, submit.page)
}

/// Apply one inbound envelope from a connection.
///
/// Validation failures are rejected silently to the sender: logged at
/// debug, no broadcast, no error frame. Storage problems never surface
/// here; the room cache stays authoritative and its writer logs failures.
pub async fn handle_message(
    rooms: &RoomManager,
    registry: &Registry,
    channel_id: &str,
    conn_id: ConnectionId,
    user: &UserProfile,
    message: WsMessage,
) {
    match message {
        WsMessage::SetPdf { pdf_id } => {
            let room = rooms.get(channel_id).await;
            let mut room = room.lock().await;
            let snapshot = rooms.set_pdf(&mut room, pdf_id).await;
            // Everyone gets the snapshot, the sender included: a document
            // switch replaces local state wholesale.
            registry.broadcast(channel_id, &WsMessage::Snapshot { data: snapshot }, None);
        }

        WsMessage::ChangePage { page } => {
            if page < 1 {
                tracing::debug!("[Session] Rejecting change_page to {} from {}", page, user.id);
                return;
            }
            let room = rooms.get(channel_id).await;
            let mut room = room.lock().await;
            if !room.set_page(page) {
                tracing::debug!(
                    "[Session] change_page with no document open in channel {}",
                    channel_id
                );
                return;
            }
            registry.broadcast(channel_id, &WsMessage::ChangePage { page }, Some(conn_id));
        }

        WsMessage::Draw(submit) => {
            if let Err(e) = validate_draw(&submit) {
                tracing::debug!("[Session] Rejecting draw from {}: {}", user.id, e);
                return;
            }
            let room = rooms.get(channel_id).await;
            let mut room = room.lock().await;
            if room.current_pdf_id.is_none() {
                tracing::debug!(
                    "[Session] Dropping draw in channel {}: no document open",
                    channel_id
                );
                return;
            }
            let op = submit.into_op(user.id.clone(), now_ms());
            room.add_draw(op.clone());
            registry.broadcast(channel_id, &WsMessage::DrawBroadcast { op }, Some(conn_id));
        }

        WsMessage::Text(submit) => {
            if let Err(e) = validate_text(&submit) {
                tracing::debug!("[Session] Rejecting text from {}: {}", user.id, e);
                return;
            }
            let room = rooms.get(channel_id).await;
            let mut room = room.lock().await;
            if room.current_pdf_id.is_none() {
                tracing::debug!(
                    "[Session] Dropping text in channel {}: no document open",
                    channel_id
                );
                return;
            }
            let op = submit.into_op(user.id.clone(), now_ms());
            room.upsert_text(op.clone());
            registry.broadcast(channel_id, &WsMessage::TextBroadcast { op }, Some(conn_id));
        }

        WsMessage::Sticky(submit) => {
            if let Err(e) = validate_sticky(&submit) {
                tracing::debug!("[Session] Rejecting sticky from {}: {}", user.id, e);
                return;
            }
            let room = rooms.get(channel_id).await;
            let mut room = room.lock().await;
            if room.current_pdf_id.is_none() {
                tracing::debug!(
                    "[Session] Dropping sticky in channel {}: no document open",
                    channel_id
                );
                return;
            }
            let op = submit.into_op(user.id.clone(), now_ms());
            room.upsert_sticky(op.clone());
            registry.broadcast(channel_id, &WsMessage::StickyBroadcast { op }, Some(conn_id));
        }

        WsMessage::ClearPage { page } => {
            if page < 1 {
                tracing::debug!("[Session] Rejecting clear_page {} from {}", page, user.id);
                return;
            }
            let room = rooms.get(channel_id).await;
            let mut room = room.lock().await;
            if room.current_pdf_id.is_none() {
                return;
            }
            room.clear_page(page);
            registry.broadcast(
                channel_id,
                &WsMessage::ClearPageBroadcast { page },
                Some(conn_id),
            );
        }

        WsMessage::DeleteAnnotation { id } => {
            if id.is_empty() {
                tracing::debug!("[Session] Rejecting delete_annotation with empty id");
                return;
            }
            let room = rooms.get(channel_id).await;
            let mut room = room.lock().await;
            // The id may belong to a page/document no longer active in
            // memory; the store delete happens regardless.
            room.delete_annotation(&id);
            registry.broadcast(
                channel_id,
                &WsMessage::DeleteAnnotationBroadcast { id },
                Some(conn_id),
            );
        }

        WsMessage::Cursor { x, y, color, .. } => {
            // Ephemeral relay; the userId in the payload is replaced with
            // the authenticated one.
            registry.update_cursor(
                channel_id,
                &user.id,
                CursorPosition {
                    x,
                    y,
                    color: color.clone(),
                },
            );
            registry.broadcast(
                channel_id,
                &WsMessage::Cursor {
                    user_id: user.id.clone(),
                    x,
                    y,
                    color,
                },
                Some(conn_id),
            );
        }

        WsMessage::Chat { data } => {
            registry.broadcast(channel_id, &WsMessage::Chat { data }, Some(conn_id));
        }

        // Server-to-client envelopes have no meaning inbound.
        WsMessage::Snapshot { .. }
        | WsMessage::DrawBroadcast { .. }
        | WsMessage::TextBroadcast { .. }
        | WsMessage::StickyBroadcast { .. }
        | WsMessage::ClearPageBroadcast { .. }
        | WsMessage::DeleteAnnotationBroadcast { .. }
        | WsMessage::PdfDeleted { .. }
        | WsMessage::UserJoined { .. }
        | WsMessage::UserLeft { .. } => {
            tracing::debug!(
                "[Session] Ignoring server-only envelope from client {}",
                user.id
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::Point;

    fn draw_submit(id: &str, points: usize) -> DrawSubmit {
        DrawSubmit {
            id: id.to_string(),
            page: 1,
            path: (0..points)
                .map(|i| Point {
                    x: i as f64,
                    y: i as f64,
                })
                .collect(),
            color: "#ff0000".to_string(),
            size: 2.0,
            opacity: 1.0,
        }
    }

    #[test]
    fn test_draw_validation() {
        assert!(validate_draw(&draw_submit("s1", 2)).is_ok());
        assert!(validate_draw(&draw_submit("s1", 1)).is_err());
        assert!(validate_draw(&draw_submit("", 2)).is_err());

        let mut bad_page = draw_submit("s1", 2);
        bad_page.page = 0;
        assert!(validate_draw(&bad_page).is_err());
    }

    #[test]
    fn test_text_validation() {
        let submit = TextSubmit {
            id: "t1".to_string(),
            page: 1,
            x: 0.0,
            y: 0.0,
            width: None,
            height: None,
            text: String::new(), // empty text is allowed
            color: "#000".to_string(),
            font_size: 12.0,
            font_family: None,
        };
        assert!(validate_text(&submit).is_ok());

        let mut no_id = submit.clone();
        no_id.id = String::new();
        assert!(validate_text(&no_id).is_err());
    }
}
