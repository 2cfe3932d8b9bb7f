//! Annotation Store
//!
//! Durable keyed table of annotations, scoped by (channel, document, page),
//! backed by SQLite via sqlx. This is the system of record: the in-memory
//! room cache is a working-set view over it and must never silently diverge
//! from it for any annotation the store has accepted.
//!
//! # Schema
//!
//! One row per annotation, primary key = annotation id. The full op payload
//! is stored opaquely as JSON in `data` with a `kind` discriminant column;
//! secondary indexes on (channel_id, pdf_id) and (channel_id, pdf_id, page)
//! support whole-document and single-page loads. Schema is managed with
//! `sqlx::migrate!`.
//!
//! # Failure semantics
//!
//! All mutations return `Result` and propagate storage failures to the
//! caller, which treats them as best-effort-durable: the in-memory cache
//! stays authoritative for the process's uptime and the periodic flush
//! sweep eventually re-lands anything a failed write dropped. Rows that
//! cannot be interpreted (unknown kind, undeserializable payload) are
//! skipped with a warning during load, never fatal.

use std::str::FromStr;

use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::backend::error::BackendError;
use crate::shared::{Annotation, AnnotationKind, DrawOp, StickyOp, TextOp};

/// Annotations for one (channel, document), split by kind and ordered by
/// `created_at` ascending, oldest first (replay and z-order).
#[derive(Debug, Default, Clone)]
pub struct LoadedAnnotations {
    pub draw_ops: Vec<DrawOp>,
    pub text_ops: Vec<TextOp>,
    pub sticky_ops: Vec<StickyOp>,
}

impl LoadedAnnotations {
    pub fn len(&self) -> usize {
        self.draw_ops.len() + self.text_ops.len() + self.sticky_ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Aggregate store statistics for operational visibility.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total_annotations: i64,
    pub total_channels: i64,
    pub total_pdfs: i64,
    pub db_size_bytes: i64,
}

/// One document a channel has annotated, for per-channel history.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PdfHistoryEntry {
    pub pdf_id: String,
    pub count: i64,
    pub latest: i64,
}

#[derive(sqlx::FromRow)]
struct AnnotationRow {
    id: String,
    kind: String,
    data: String,
}

/// Handle to the annotations database. Cheap to clone (pool handle).
#[derive(Debug, Clone)]
pub struct AnnotationStore {
    pool: SqlitePool,
}

impl AnnotationStore {
    /// Open (creating if missing) the database and run migrations.
    ///
    /// Loss of the backing store at startup is the one unrecoverable
    /// condition in the system: this fails fast rather than letting the
    /// process serve with a silently empty store.
    pub async fn connect(database_url: &str) -> Result<Self, BackendError> {
        // Ensure the database directory exists for file-backed URLs.
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            if path != ":memory:" {
                if let Some(parent) = std::path::Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent).map_err(|e| {
                            BackendError::config(format!(
                                "cannot create database directory {}: {}",
                                parent.display(),
                                e
                            ))
                        })?;
                    }
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(BackendError::Storage)?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        tracing::info!("[Store] Running database migrations...");
        sqlx::migrate!().run(&pool).await?;
        tracing::info!("[Store] Database initialized: {}", database_url);

        Ok(Self { pool })
    }

    /// Wrap an existing pool. Used by tests that manage their own database.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or overwrite a single annotation. Idempotent: the same id
    /// overwrites payload and timestamp and never fails on duplicate.
    pub async fn upsert(
        &self,
        channel_id: &str,
        pdf_id: &str,
        annotation: &Annotation,
    ) -> Result<(), BackendError> {
        let data = serde_json::to_string(annotation)?;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO annotations
                (id, channel_id, pdf_id, page, kind, data, user_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(annotation.id())
        .bind(channel_id)
        .bind(pdf_id)
        .bind(annotation.page() as i64)
        .bind(annotation.kind().as_str())
        .bind(data)
        .bind(annotation.user_id())
        .bind(annotation.ts())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Upsert a batch of annotations as a single transaction (used by the
    /// working-set flush). Either all rows land or none do.
    pub async fn upsert_batch(
        &self,
        channel_id: &str,
        pdf_id: &str,
        annotations: &[Annotation],
    ) -> Result<(), BackendError> {
        let mut tx = self.pool.begin().await?;
        for annotation in annotations {
            let data = serde_json::to_string(annotation)?;
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO annotations
                    (id, channel_id, pdf_id, page, kind, data, user_id, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(annotation.id())
            .bind(channel_id)
            .bind(pdf_id)
            .bind(annotation.page() as i64)
            .bind(annotation.kind().as_str())
            .bind(data)
            .bind(annotation.user_id())
            .bind(annotation.ts())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Load all annotations for a (channel, document), oldest first.
    pub async fn load_all(
        &self,
        channel_id: &str,
        pdf_id: &str,
    ) -> Result<LoadedAnnotations, BackendError> {
        let rows = sqlx::query_as::<_, AnnotationRow>(
            r#"
            SELECT id, kind, data FROM annotations
            WHERE channel_id = ? AND pdf_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(channel_id)
        .bind(pdf_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Self::decode_rows(rows))
    }

    /// Load annotations for a single page, filtered server-side.
    pub async fn load_page(
        &self,
        channel_id: &str,
        pdf_id: &str,
        page: u32,
    ) -> Result<LoadedAnnotations, BackendError> {
        let rows = sqlx::query_as::<_, AnnotationRow>(
            r#"
            SELECT id, kind, data FROM annotations
            WHERE channel_id = ? AND pdf_id = ? AND page = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(channel_id)
        .bind(pdf_id)
        .bind(page as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(Self::decode_rows(rows))
    }

    /// Decode rows into variant collections, skipping corrupt records.
    fn decode_rows(rows: Vec<AnnotationRow>) -> LoadedAnnotations {
        let mut loaded = LoadedAnnotations::default();
        for row in rows {
            let Some(kind) = AnnotationKind::parse(&row.kind) else {
                tracing::warn!(
                    "[Store] Skipping corrupt record '{}': unknown kind '{}'",
                    row.id,
                    row.kind
                );
                continue;
            };
            let annotation = match serde_json::from_str::<Annotation>(&row.data) {
                Ok(annotation) => annotation,
                Err(e) => {
                    tracing::warn!(
                        "[Store] Skipping corrupt record '{}': undeserializable payload: {}",
                        row.id,
                        e
                    );
                    continue;
                }
            };
            if annotation.kind() != kind {
                tracing::warn!(
                    "[Store] Skipping corrupt record '{}': kind column '{}' does not match payload",
                    row.id,
                    row.kind
                );
                continue;
            }
            match annotation {
                Annotation::Draw(op) => loaded.draw_ops.push(op),
                Annotation::Text(op) => loaded.text_ops.push(op),
                Annotation::Sticky(op) => loaded.sticky_ops.push(op),
            }
        }
        loaded
    }

    /// Delete one annotation by id, regardless of kind or page.
    pub async fn delete_by_id(&self, id: &str) -> Result<(), BackendError> {
        sqlx::query("DELETE FROM annotations WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete every annotation on one page of a (channel, document).
    pub async fn delete_page(
        &self,
        channel_id: &str,
        pdf_id: &str,
        page: u32,
    ) -> Result<(), BackendError> {
        sqlx::query("DELETE FROM annotations WHERE channel_id = ? AND pdf_id = ? AND page = ?")
            .bind(channel_id)
            .bind(pdf_id)
            .bind(page as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete a document's annotations within one channel.
    pub async fn delete_pdf(&self, channel_id: &str, pdf_id: &str) -> Result<(), BackendError> {
        sqlx::query("DELETE FROM annotations WHERE channel_id = ? AND pdf_id = ?")
            .bind(channel_id)
            .bind(pdf_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete a document's annotations across every channel that referenced
    /// it. Used when a document is permanently removed from the library.
    pub async fn delete_pdf_everywhere(&self, pdf_id: &str) -> Result<(), BackendError> {
        sqlx::query("DELETE FROM annotations WHERE pdf_id = ?")
            .bind(pdf_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Count annotations for a (channel, document).
    pub async fn count_for(&self, channel_id: &str, pdf_id: &str) -> Result<i64, BackendError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM annotations WHERE channel_id = ? AND pdf_id = ?",
        )
        .bind(channel_id)
        .bind(pdf_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Documents a channel has annotated, most recently touched first.
    pub async fn pdfs_for_channel(
        &self,
        channel_id: &str,
    ) -> Result<Vec<PdfHistoryEntry>, BackendError> {
        let rows = sqlx::query_as::<_, PdfHistoryEntry>(
            r#"
            SELECT pdf_id, COUNT(*) as count, MAX(created_at) as latest
            FROM annotations
            WHERE channel_id = ?
            GROUP BY pdf_id
            ORDER BY latest DESC
            "#,
        )
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Maintenance sweep: delete annotations older than `days_old` days.
    /// Returns the number of rows removed.
    pub async fn purge_older_than(&self, days_old: i64) -> Result<u64, BackendError> {
        let cutoff = chrono::Utc::now().timestamp_millis() - days_old * 24 * 60 * 60 * 1000;
        let result = sqlx::query("DELETE FROM annotations WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Aggregate statistics: row count, distinct channels, distinct
    /// documents, and the database file footprint.
    pub async fn stats(&self) -> Result<StoreStats, BackendError> {
        let total_annotations =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM annotations")
                .fetch_one(&self.pool)
                .await?;
        let total_channels =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(DISTINCT channel_id) FROM annotations")
                .fetch_one(&self.pool)
                .await?;
        let total_pdfs =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(DISTINCT pdf_id) FROM annotations")
                .fetch_one(&self.pool)
                .await?;
        let db_size_bytes = sqlx::query_scalar::<_, i64>(
            "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(StoreStats {
            total_annotations,
            total_channels,
            total_pdfs,
            db_size_bytes,
        })
    }
}
