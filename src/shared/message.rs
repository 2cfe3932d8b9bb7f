//! Wire Protocol Message Taxonomy
//!
//! This module defines every message envelope exchanged over the WebSocket
//! connection. Envelopes are JSON objects with a single `type` discriminant
//! field plus a camelCase payload, e.g.:
//!
//! ```json
//! { "type": "set_pdf", "pdfId": "book.pdf" }
//! { "type": "change_page", "page": 7 }
//! ```
//!
//! # Submissions vs. broadcasts
//!
//! Annotation submissions (`draw`, `text`, `sticky`) arrive without author
//! or timestamp; the server attaches the authenticated `userId` and its own
//! `ts` and relays the enriched op as the matching `*_broadcast` envelope to
//! every other connection in the channel. The originating client applies its
//! own optimistic copy rather than waiting for an echo.

use serde::{Deserialize, Serialize};

use super::annotation::{ChatMessage, DrawOp, Point, StickyOp, TextOp, UserProfile};
use super::room::RoomSnapshot;

/// A draw stroke as submitted by a client, before server enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawSubmit {
    pub id: String,
    pub page: u32,
    pub path: Vec<Point>,
    pub color: String,
    pub size: f64,
    pub opacity: f64,
}

impl DrawSubmit {
    /// Attach the authenticated author and server timestamp.
    pub fn into_op(self, user_id: impl Into<String>, ts: i64) -> DrawOp {
        DrawOp {
            id: self.id,
            page: self.page,
            path: self.path,
            color: self.color,
            size: self.size,
            opacity: self.opacity,
            user_id: user_id.into(),
            ts,
        }
    }
}

/// A text note as submitted by a client, before server enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextSubmit {
    pub id: String,
    pub page: u32,
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    pub text: String,
    pub color: String,
    pub font_size: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
}

impl TextSubmit {
    pub fn into_op(self, user_id: impl Into<String>, ts: i64) -> TextOp {
        TextOp {
            id: self.id,
            page: self.page,
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            text: self.text,
            color: self.color,
            font_size: self.font_size,
            font_family: self.font_family,
            user_id: user_id.into(),
            ts,
        }
    }
}

/// A sticky note as submitted by a client, before server enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StickySubmit {
    pub id: String,
    pub page: u32,
    pub x: f64,
    pub y: f64,
    pub text: String,
    pub color: String,
}

impl StickySubmit {
    pub fn into_op(self, user_id: impl Into<String>, ts: i64) -> StickyOp {
        StickyOp {
            id: self.id,
            page: self.page,
            x: self.x,
            y: self.y,
            text: self.text,
            color: self.color,
            user_id: user_id.into(),
            ts,
        }
    }
}

/// Every envelope the protocol knows, in both directions.
///
/// Handling code matches exhaustively; server-to-client envelopes arriving
/// inbound are ignored with a debug log rather than treated as an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Open a document (or `None` to return to the library view).
    #[serde(rename_all = "camelCase")]
    SetPdf {
        #[serde(default)]
        pdf_id: Option<String>,
    },
    ChangePage {
        page: u32,
    },
    /// Full-state replacement, sent on connect and after document switches.
    Snapshot {
        data: RoomSnapshot,
    },
    Draw(DrawSubmit),
    DrawBroadcast {
        op: DrawOp,
    },
    Text(TextSubmit),
    TextBroadcast {
        op: TextOp,
    },
    Sticky(StickySubmit),
    StickyBroadcast {
        op: StickyOp,
    },
    ClearPage {
        page: u32,
    },
    ClearPageBroadcast {
        page: u32,
    },
    DeleteAnnotation {
        id: String,
    },
    DeleteAnnotationBroadcast {
        id: String,
    },
    /// Ephemeral cursor relay. Last-value-wins per user, never persisted.
    #[serde(rename_all = "camelCase")]
    Cursor {
        user_id: String,
        x: f64,
        y: f64,
        color: String,
    },
    #[serde(rename_all = "camelCase")]
    PdfDeleted {
        pdf_id: String,
    },
    UserJoined {
        user: UserProfile,
    },
    #[serde(rename_all = "camelCase")]
    UserLeft {
        user_id: String,
    },
    /// Peer-to-peer chat relay. Not persisted by this server.
    Chat {
        data: ChatMessage,
    },
}
