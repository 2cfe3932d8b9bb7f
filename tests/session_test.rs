//! End-to-end session protocol tests: two connections in one channel, with
//! real rooms, a real store, and the fan-out registry.

mod common;

use common::*;
use pdfpals::backend::realtime::{ConnectionId, Registry};
use pdfpals::backend::rooms::RoomManager;
use pdfpals::backend::session::handle_message;
use pdfpals::shared::{
    ChatMessage, DrawSubmit, Point, StickySubmit, UserProfile, WsMessage,
};
use pretty_assertions::assert_eq;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use uuid::Uuid;

fn profile(id: &str) -> UserProfile {
    UserProfile {
        id: id.to_string(),
        username: format!("user-{}", id),
        discriminator: "0".to_string(),
        avatar: None,
    }
}

fn connect(
    registry: &Registry,
    channel: &str,
    user: &str,
) -> (ConnectionId, UserProfile, UnboundedReceiver<WsMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let conn_id = Uuid::new_v4();
    let user = profile(user);
    registry.register(channel, conn_id, user.clone(), tx);
    (conn_id, user, rx)
}

fn drain(rx: &mut UnboundedReceiver<WsMessage>) -> Vec<WsMessage> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        out.push(msg);
    }
    out
}

fn stroke(id: &str, page: u32) -> DrawSubmit {
    DrawSubmit {
        id: id.to_string(),
        page,
        path: vec![Point { x: 0.0, y: 0.0 }, Point { x: 5.0, y: 5.0 }],
        color: "#00ff00".to_string(),
        size: 3.0,
        opacity: 0.8,
    }
}

#[tokio::test]
async fn test_draw_requires_open_document() {
    let (store, _dir) = temp_store().await;
    let rooms = RoomManager::new(store, 500);
    let registry = Registry::new();

    let (c1, u1, mut rx1) = connect(&registry, "chan", "u1");
    let (_c2, _u2, mut rx2) = connect(&registry, "chan", "u2");
    drain(&mut rx1);
    drain(&mut rx2);

    // No document open: the stroke is silently dropped.
    handle_message(&rooms, &registry, "chan", c1, &u1, WsMessage::Draw(stroke("s1", 1))).await;
    assert!(drain(&mut rx2).is_empty());
    assert_eq!(rooms.snapshot("chan").await.draw_ops.len(), 0);
}

#[tokio::test]
async fn test_set_pdf_snapshots_everyone_then_draw_broadcasts_enriched() {
    let (store, _dir) = temp_store().await;
    let rooms = RoomManager::new(store.clone(), 500);
    let registry = Registry::new();

    let (c1, u1, mut rx1) = connect(&registry, "chan", "u1");
    let (_c2, _u2, mut rx2) = connect(&registry, "chan", "u2");
    drain(&mut rx1);
    drain(&mut rx2);

    handle_message(
        &rooms,
        &registry,
        "chan",
        c1,
        &u1,
        WsMessage::SetPdf {
            pdf_id: Some("doc.pdf".to_string()),
        },
    )
    .await;

    // The document switch snapshots everyone, sender included.
    let to_sender = drain(&mut rx1);
    assert_eq!(to_sender.len(), 1);
    assert!(matches!(
        &to_sender[0],
        WsMessage::Snapshot { data } if data.current_pdf_id.as_deref() == Some("doc.pdf")
    ));
    assert_eq!(drain(&mut rx2).len(), 1);

    handle_message(&rooms, &registry, "chan", c1, &u1, WsMessage::Draw(stroke("s1", 2))).await;

    // The author gets no echo; the peer gets the enriched op.
    assert!(drain(&mut rx1).is_empty());
    let to_peer = drain(&mut rx2);
    assert_eq!(to_peer.len(), 1);
    let WsMessage::DrawBroadcast { op } = &to_peer[0] else {
        panic!("expected draw_broadcast");
    };
    assert_eq!(op.id, "s1");
    assert_eq!(op.user_id, "u1");
    assert!(op.ts > 0);

    // Closing the document flushes; the stroke is durable.
    handle_message(&rooms, &registry, "chan", c1, &u1, WsMessage::SetPdf { pdf_id: None }).await;
    let loaded = store.load_all("chan", "doc.pdf").await.unwrap();
    assert_eq!(loaded.draw_ops.len(), 1);
    assert_eq!(loaded.draw_ops[0].user_id, "u1");
}

#[tokio::test]
async fn test_ops_in_connect_window_reach_registered_connection() {
    let (store, _dir) = temp_store().await;
    let rooms = RoomManager::new(store, 500);
    let registry = Registry::new();

    let (c1, u1, mut rx1) = connect(&registry, "chan", "u1");
    handle_message(
        &rooms,
        &registry,
        "chan",
        c1,
        &u1,
        WsMessage::SetPdf {
            pdf_id: Some("doc.pdf".to_string()),
        },
    )
    .await;
    drain(&mut rx1);

    // A second connection has joined the fan-out set but has not yet been
    // sent its snapshot when an op lands.
    let (_c2, _u2, mut rx2) = connect(&registry, "chan", "u2");
    drain(&mut rx1);
    handle_message(&rooms, &registry, "chan", c1, &u1, WsMessage::Draw(stroke("s1", 1))).await;

    // The op arrives as a broadcast, and the snapshot assembled afterwards
    // carries it too; the client dedupes by id.
    let received = drain(&mut rx2);
    assert!(received
        .iter()
        .any(|m| matches!(m, WsMessage::DrawBroadcast { op } if op.id == "s1")));
    let snapshot = rooms.snapshot("chan").await;
    assert_eq!(snapshot.draw_ops.len(), 1);
    assert_eq!(snapshot.draw_ops[0].id, "s1");
}

#[tokio::test]
async fn test_change_page_excludes_sender() {
    let (store, _dir) = temp_store().await;
    let rooms = RoomManager::new(store, 500);
    let registry = Registry::new();

    let (c1, u1, mut rx1) = connect(&registry, "chan", "u1");
    let (_c2, _u2, mut rx2) = connect(&registry, "chan", "u2");

    handle_message(
        &rooms,
        &registry,
        "chan",
        c1,
        &u1,
        WsMessage::SetPdf {
            pdf_id: Some("doc.pdf".to_string()),
        },
    )
    .await;
    drain(&mut rx1);
    drain(&mut rx2);

    handle_message(&rooms, &registry, "chan", c1, &u1, WsMessage::ChangePage { page: 7 }).await;
    assert!(drain(&mut rx1).is_empty());
    assert_eq!(drain(&mut rx2), vec![WsMessage::ChangePage { page: 7 }]);
    assert_eq!(rooms.snapshot("chan").await.current_page, 7);
}

#[tokio::test]
async fn test_cursor_relay_forces_authenticated_user_id() {
    let (store, _dir) = temp_store().await;
    let rooms = RoomManager::new(store, 500);
    let registry = Registry::new();

    let (c1, u1, mut rx1) = connect(&registry, "chan", "u1");
    let (_c2, _u2, mut rx2) = connect(&registry, "chan", "u2");
    drain(&mut rx1);
    drain(&mut rx2);

    // The client claims to be someone else; the relay overrides it.
    handle_message(
        &rooms,
        &registry,
        "chan",
        c1,
        &u1,
        WsMessage::Cursor {
            user_id: "impostor".to_string(),
            x: 0.5,
            y: 0.5,
            color: "#abc".to_string(),
        },
    )
    .await;

    let to_peer = drain(&mut rx2);
    assert_eq!(to_peer.len(), 1);
    assert!(matches!(
        &to_peer[0],
        WsMessage::Cursor { user_id, .. } if user_id == "u1"
    ));
    assert!(drain(&mut rx1).is_empty());
}

#[tokio::test]
async fn test_sticky_upsert_and_delete_round_trip() {
    let (store, _dir) = temp_store().await;
    let rooms = RoomManager::new(store, 500);
    let registry = Registry::new();

    let (c1, u1, mut rx1) = connect(&registry, "chan", "u1");
    let (_c2, _u2, mut rx2) = connect(&registry, "chan", "u2");

    handle_message(
        &rooms,
        &registry,
        "chan",
        c1,
        &u1,
        WsMessage::SetPdf {
            pdf_id: Some("doc.pdf".to_string()),
        },
    )
    .await;
    drain(&mut rx1);
    drain(&mut rx2);

    let submit = StickySubmit {
        id: "n1".to_string(),
        page: 1,
        x: 10.0,
        y: 20.0,
        text: "first".to_string(),
        color: "#ffeb3b".to_string(),
    };
    handle_message(&rooms, &registry, "chan", c1, &u1, WsMessage::Sticky(submit.clone())).await;

    // Moving the note re-sends the same id; memory keeps one copy.
    let moved = StickySubmit {
        text: "moved".to_string(),
        x: 99.0,
        ..submit
    };
    handle_message(&rooms, &registry, "chan", c1, &u1, WsMessage::Sticky(moved)).await;

    let snapshot = rooms.snapshot("chan").await;
    assert_eq!(snapshot.sticky_ops.len(), 1);
    assert_eq!(snapshot.sticky_ops[0].text, "moved");
    assert_eq!(drain(&mut rx2).len(), 2);

    handle_message(
        &rooms,
        &registry,
        "chan",
        c1,
        &u1,
        WsMessage::DeleteAnnotation {
            id: "n1".to_string(),
        },
    )
    .await;
    assert_eq!(rooms.snapshot("chan").await.sticky_ops.len(), 0);
    assert_eq!(
        drain(&mut rx2),
        vec![WsMessage::DeleteAnnotationBroadcast {
            id: "n1".to_string()
        }]
    );
}

#[tokio::test]
async fn test_clear_page_only_touches_that_page() {
    let (store, _dir) = temp_store().await;
    let rooms = RoomManager::new(store, 500);
    let registry = Registry::new();

    let (c1, u1, mut rx1) = connect(&registry, "chan", "u1");
    let (_c2, _u2, mut rx2) = connect(&registry, "chan", "u2");

    handle_message(
        &rooms,
        &registry,
        "chan",
        c1,
        &u1,
        WsMessage::SetPdf {
            pdf_id: Some("doc.pdf".to_string()),
        },
    )
    .await;
    handle_message(&rooms, &registry, "chan", c1, &u1, WsMessage::Draw(stroke("p1", 1))).await;
    handle_message(&rooms, &registry, "chan", c1, &u1, WsMessage::Draw(stroke("p2", 2))).await;
    drain(&mut rx1);
    drain(&mut rx2);

    handle_message(&rooms, &registry, "chan", c1, &u1, WsMessage::ClearPage { page: 1 }).await;
    assert_eq!(drain(&mut rx2), vec![WsMessage::ClearPageBroadcast { page: 1 }]);

    let snapshot = rooms.snapshot("chan").await;
    assert_eq!(snapshot.draw_ops.len(), 1);
    assert_eq!(snapshot.draw_ops[0].page, 2);
}

#[tokio::test]
async fn test_chat_relayed_not_persisted() {
    let (store, _dir) = temp_store().await;
    let rooms = RoomManager::new(store.clone(), 500);
    let registry = Registry::new();

    let (c1, u1, mut rx1) = connect(&registry, "chan", "u1");
    let (_c2, _u2, mut rx2) = connect(&registry, "chan", "u2");
    drain(&mut rx1);
    drain(&mut rx2);

    let chat = ChatMessage {
        id: "m1".to_string(),
        user_id: "u1".to_string(),
        text: "look at page 4".to_string(),
        timestamp: "2026-08-28T12:00:00Z".to_string(),
        is_system: None,
    };
    handle_message(&rooms, &registry, "chan", c1, &u1, WsMessage::Chat { data: chat.clone() }).await;

    assert_eq!(drain(&mut rx2), vec![WsMessage::Chat { data: chat }]);
    assert!(drain(&mut rx1).is_empty());
    assert_eq!(store.stats().await.unwrap().total_annotations, 0);
}

#[tokio::test]
async fn test_server_only_envelopes_ignored_inbound() {
    let (store, _dir) = temp_store().await;
    let rooms = RoomManager::new(store, 500);
    let registry = Registry::new();

    let (c1, u1, mut rx1) = connect(&registry, "chan", "u1");
    let (_c2, _u2, mut rx2) = connect(&registry, "chan", "u2");
    drain(&mut rx1);
    drain(&mut rx2);

    handle_message(
        &rooms,
        &registry,
        "chan",
        c1,
        &u1,
        WsMessage::UserLeft {
            user_id: "u2".to_string(),
        },
    )
    .await;
    handle_message(
        &rooms,
        &registry,
        "chan",
        c1,
        &u1,
        WsMessage::PdfDeleted {
            pdf_id: "doc.pdf".to_string(),
        },
    )
    .await;

    assert!(drain(&mut rx1).is_empty());
    assert!(drain(&mut rx2).is_empty());
}
