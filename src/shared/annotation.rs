//! Annotation Data Structures
//!
//! This module defines the annotation sum type shared between the server and
//! any connected client. An annotation is one of three variants (draw stroke,
//! text note, sticky note) carrying a common envelope: a client-generated
//! `id`, a 1-based `page`, the author's `userId`, and a server-assigned `ts`
//! in epoch milliseconds. The timestamp is the authoritative ordering key for
//! replay and z-order.
//!
//! # Identity
//!
//! The `id` is the sole identity used for update and delete within a
//! (channel, document) scope. Re-sending an op with an existing id is an
//! update, not a duplicate insert. The exception is draw strokes, which are
//! append-only and are only ever created or deleted whole.
//!
//! # Serialization
//!
//! Annotations serialize as JSON objects with a `type` discriminant field
//! (`draw`, `text`, `sticky`) and camelCase payload fields, matching the wire
//! protocol the clients speak.

use serde::{Deserialize, Serialize};

/// A 2-D point on a PDF page, in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// A committed freehand stroke.
///
/// Strokes are append-only: a stroke is never edited in place, only created
/// or deleted whole. A committed stroke carries at least two points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "draw", rename_all = "camelCase")]
pub struct DrawOp {
    pub id: String,
    pub page: u32,
    pub path: Vec<Point>,
    pub color: String,
    pub size: f64,
    pub opacity: f64,
    pub user_id: String,
    /// Server-assigned creation time, epoch milliseconds.
    pub ts: i64,
}

/// A positioned text note, upserted by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "text", rename_all = "camelCase")]
pub struct TextOp {
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
    pub user_id: String,
    pub ts: i64,
}

/// A sticky note, upserted by id. `color` is the background color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "sticky", rename_all = "camelCase")]
pub struct StickyOp {
    pub id: String,
    pub page: u32,
    pub x: f64,
    pub y: f64,
    pub text: String,
    pub color: String,
    pub user_id: String,
    pub ts: i64,
}

/// The annotation sum type.
///
/// Every consumption site (storage rows, eviction sort, wire serialization)
/// matches exhaustively on this enum, so adding a fourth annotation kind is
/// a compile-time-checked change. The `type` field comes from the op structs
/// themselves, so an op serializes identically whether it travels bare (in a
/// broadcast or snapshot) or wrapped in this enum (in a storage row).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Annotation {
    Draw(DrawOp),
    Text(TextOp),
    Sticky(StickyOp),
}

/// The storage discriminant for an annotation variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationKind {
    Draw,
    Text,
    Sticky,
}

impl AnnotationKind {
    /// The `kind` column value for persisted rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draw => "draw",
            Self::Text => "text",
            Self::Sticky => "sticky",
        }
    }

    /// Parse a stored discriminant. Returns `None` for unrecognized kinds,
    /// which callers treat as a corrupt record.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draw" => Some(Self::Draw),
            "text" => Some(Self::Text),
            "sticky" => Some(Self::Sticky),
            _ => None,
        }
    }
}

impl Annotation {
    pub fn id(&self) -> &str {
        match self {
            Self::Draw(op) => &op.id,
            Self::Text(op) => &op.id,
            Self::Sticky(op) => &op.id,
        }
    }

    pub fn page(&self) -> u32 {
        match self {
            Self::Draw(op) => op.page,
            Self::Text(op) => op.page,
            Self::Sticky(op) => op.page,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            Self::Draw(op) => &op.user_id,
            Self::Text(op) => &op.user_id,
            Self::Sticky(op) => &op.user_id,
        }
    }

    /// The authoritative ordering key (epoch milliseconds).
    pub fn ts(&self) -> i64 {
        match self {
            Self::Draw(op) => op.ts,
            Self::Text(op) => op.ts,
            Self::Sticky(op) => op.ts,
        }
    }

    pub fn kind(&self) -> AnnotationKind {
        match self {
            Self::Draw(_) => AnnotationKind::Draw,
            Self::Text(_) => AnnotationKind::Text,
            Self::Sticky(_) => AnnotationKind::Sticky,
        }
    }
}

/// A connected user's profile, supplied by the identity provider at
/// connection time. Not persisted by this server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub discriminator: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// A chat message, relayed between peers only. Chat is not covered by the
/// annotation persistence layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub user_id: String,
    pub text: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_system: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draw(id: &str, ts: i64) -> Annotation {
        Annotation::Draw(DrawOp {
            id: id.to_string(),
            page: 1,
            path: vec![Point { x: 0.0, y: 0.0 }, Point { x: 1.0, y: 1.0 }],
            color: "#ff0000".to_string(),
            size: 2.0,
            opacity: 1.0,
            user_id: "u1".to_string(),
            ts,
        })
    }

    #[test]
    fn test_annotation_envelope_accessors() {
        let a = draw("s1", 42);
        assert_eq!(a.id(), "s1");
        assert_eq!(a.page(), 1);
        assert_eq!(a.user_id(), "u1");
        assert_eq!(a.ts(), 42);
        assert_eq!(a.kind(), AnnotationKind::Draw);
    }

    #[test]
    fn test_annotation_tagged_serialization() {
        let a = draw("s1", 42);
        let json = serde_json::to_string(&a).unwrap();
        assert!(json.contains(r#""type":"draw""#));
        assert!(json.contains(r#""userId":"u1""#));

        let back: Annotation = serde_json::from_str(&json).unwrap();
        assert_eq!(a, back);
    }

    #[test]
    fn test_text_op_optional_fields_omitted() {
        let a = Annotation::Text(TextOp {
            id: "t1".to_string(),
            page: 3,
            x: 10.0,
            y: 20.0,
            width: None,
            height: None,
            text: "hello".to_string(),
            color: "#000000".to_string(),
            font_size: 14.0,
            font_family: None,
            user_id: "u1".to_string(),
            ts: 1,
        });
        let json = serde_json::to_string(&a).unwrap();
        assert!(!json.contains("width"));
        assert!(!json.contains("fontFamily"));
        assert!(json.contains(r#""fontSize":14.0"#));
    }

    #[test]
    fn test_bare_op_carries_kind_discriminant() {
        // Clients branch on the op-level `type` field, so it must be
        // present on a bare op, not only on the enum wrapper.
        let Annotation::Draw(op) = draw("s1", 42) else {
            unreachable!();
        };
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["type"], "draw");

        let sticky = StickyOp {
            id: "n1".to_string(),
            page: 1,
            x: 0.0,
            y: 0.0,
            text: "hi".to_string(),
            color: "#ffeb3b".to_string(),
            user_id: "u1".to_string(),
            ts: 1,
        };
        assert_eq!(serde_json::to_value(&sticky).unwrap()["type"], "sticky");
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in [AnnotationKind::Draw, AnnotationKind::Text, AnnotationKind::Sticky] {
            assert_eq!(AnnotationKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(AnnotationKind::parse("highlight"), None);
    }

    #[test]
    fn test_unknown_type_fails_deserialization() {
        let json = r#"{"type":"highlight","id":"h1","page":1,"userId":"u1","ts":1}"#;
        let result: Result<Annotation, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
