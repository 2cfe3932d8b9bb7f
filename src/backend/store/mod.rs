//! Durable annotation persistence (SQLite via sqlx)

pub mod db;

pub use db::{AnnotationStore, LoadedAnnotations, PdfHistoryEntry, StoreStats};
