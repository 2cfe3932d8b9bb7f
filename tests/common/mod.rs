//! Shared test fixtures: a throwaway SQLite store and annotation builders.
#![allow(dead_code)] // each test binary uses a subset

use pdfpals::backend::store::AnnotationStore;
use pdfpals::shared::{Annotation, DrawOp, Point, StickyOp, TextOp};
use tempfile::TempDir;

/// A migrated store backed by a temp-dir SQLite file. Keep the `TempDir`
/// alive for the duration of the test.
pub async fn temp_store() -> (AnnotationStore, TempDir) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let url = format!("sqlite://{}", dir.path().join("test.db").display());
    let store = AnnotationStore::connect(&url).await.expect("open test store");
    (store, dir)
}

pub fn draw_op(id: &str, page: u32, ts: i64) -> DrawOp {
    DrawOp {
        id: id.to_string(),
        page,
        path: vec![Point { x: 0.0, y: 0.0 }, Point { x: 10.0, y: 10.0 }],
        color: "#ff0000".to_string(),
        size: 2.0,
        opacity: 1.0,
        user_id: "u1".to_string(),
        ts,
    }
}

pub fn text_op(id: &str, page: u32, ts: i64, body: &str) -> TextOp {
    TextOp {
        id: id.to_string(),
        page,
        x: 50.0,
        y: 60.0,
        width: None,
        height: None,
        text: body.to_string(),
        color: "#000000".to_string(),
        font_size: 14.0,
        font_family: None,
        user_id: "u1".to_string(),
        ts,
    }
}

pub fn sticky_op(id: &str, page: u32, ts: i64, body: &str) -> StickyOp {
    StickyOp {
        id: id.to_string(),
        page,
        x: 100.0,
        y: 120.0,
        text: body.to_string(),
        color: "#ffeb3b".to_string(),
        user_id: "u1".to_string(),
        ts,
    }
}

pub fn draw(id: &str, page: u32, ts: i64) -> Annotation {
    Annotation::Draw(draw_op(id, page, ts))
}

pub fn text(id: &str, page: u32, ts: i64, body: &str) -> Annotation {
    Annotation::Text(text_op(id, page, ts, body))
}

pub fn sticky(id: &str, page: u32, ts: i64, body: &str) -> Annotation {
    Annotation::Sticky(sticky_op(id, page, ts, body))
}
