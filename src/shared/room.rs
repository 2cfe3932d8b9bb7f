//! Room Snapshot Wire Shape
//!
//! A snapshot is the full-state message sent to a newly connected or newly
//! synced client. Clients replace their entire local state with it.

use serde::{Deserialize, Serialize};

use super::annotation::{DrawOp, StickyOp, TextOp};

/// The complete visible state of one channel's room.
///
/// `current_pdf_id` of `None` means no document is open (the client shows
/// the library). The three collections hold only the annotations belonging
/// to the current document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub channel_id: String,
    pub current_pdf_id: Option<String>,
    pub current_page: u32,
    pub draw_ops: Vec<DrawOp>,
    pub text_ops: Vec<TextOp>,
    pub sticky_ops: Vec<StickyOp>,
}

impl RoomSnapshot {
    /// An empty room: no document, page 1, no annotations.
    pub fn empty(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            current_pdf_id: None,
            current_page: 1,
            draw_ops: Vec::new(),
            text_ops: Vec::new(),
            sticky_ops: Vec::new(),
        }
    }

    pub fn annotation_count(&self) -> usize {
        self.draw_ops.len() + self.text_ops.len() + self.sticky_ops.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot() {
        let snap = RoomSnapshot::empty("c1");
        assert_eq!(snap.channel_id, "c1");
        assert_eq!(snap.current_pdf_id, None);
        assert_eq!(snap.current_page, 1);
        assert_eq!(snap.annotation_count(), 0);
    }

    #[test]
    fn test_snapshot_field_names() {
        let snap = RoomSnapshot::empty("c1");
        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.contains(r#""channelId":"c1""#));
        assert!(json.contains(r#""currentPdfId":null"#));
        assert!(json.contains(r#""currentPage":1"#));
        assert!(json.contains(r#""drawOps":[]"#));
    }
}
