//! HTTP API Handlers
//!
//! A small management surface next to the WebSocket endpoint: liveness,
//! operational stats, and the library-wide PDF delete hook called by the
//! upload service when a document is removed.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::backend::server::AppState;
use crate::backend::store::PdfHistoryEntry;
use crate::shared::WsMessage;

pub fn configure_api_routes(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/health", get(handle_health))
        .route("/api/stats", get(handle_stats))
        .route("/api/pdfs/{pdf_id}", delete(handle_delete_pdf))
        .route("/api/channels/{channel_id}/pdfs", get(handle_channel_pdfs))
        .route("/api/maintenance/purge", post(handle_purge))
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// GET /api/stats - storage totals plus live connection counters.
async fn handle_stats(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let store = state.store.stats().await.map_err(|e| {
        tracing::error!("[Api] Failed to read store stats: {}", e);
        e.status_code()
    })?;
    let realtime = state.registry.stats();
    Ok(Json(json!({
        "store": store,
        "realtime": realtime,
    })))
}

/// DELETE /api/pdfs/{pdf_id} - a document left the library for good.
///
/// Purges its annotations in every channel, forces any room viewing it back
/// to the library view, tells every connected client (any of them might
/// have the document in their picker), and sends the affected channels a
/// fresh snapshot.
async fn handle_delete_pdf(
    State(state): State<AppState>,
    Path(pdf_id): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let affected = state.rooms.pdf_deleted(&pdf_id).await.map_err(|e| {
        tracing::error!("[Api] Failed to delete PDF {}: {}", pdf_id, e);
        e.status_code()
    })?;

    state.registry.broadcast_all(&WsMessage::PdfDeleted {
        pdf_id: pdf_id.clone(),
    });
    for channel_id in &affected {
        let snapshot = state.rooms.snapshot(channel_id).await;
        state
            .registry
            .broadcast(channel_id, &WsMessage::Snapshot { data: snapshot }, None);
    }

    tracing::info!(
        "[Api] Deleted PDF {} ({} channel(s) returned to library)",
        pdf_id,
        affected.len()
    );
    Ok(Json(json!({
        "success": true,
        "channelsAffected": affected.len(),
    })))
}

/// GET /api/channels/{channel_id}/pdfs - documents a channel has annotated,
/// most recently touched first. Backs the channel's "recent documents" list.
async fn handle_channel_pdfs(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
) -> Result<Json<Vec<PdfHistoryEntry>>, StatusCode> {
    let entries = state.store.pdfs_for_channel(&channel_id).await.map_err(|e| {
        tracing::error!("[Api] Failed to list PDFs for channel {}: {}", channel_id, e);
        e.status_code()
    })?;
    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
struct PurgeParams {
    days: Option<i64>,
}

/// POST /api/maintenance/purge?days=N - delete annotations older than N
/// days (default 90). Intended for an operator cron, not clients.
async fn handle_purge(
    State(state): State<AppState>,
    Query(params): Query<PurgeParams>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let days = params.days.unwrap_or(90);
    if days < 1 {
        return Err(StatusCode::BAD_REQUEST);
    }
    let removed = state.store.purge_older_than(days).await.map_err(|e| {
        tracing::error!("[Api] Purge failed: {}", e);
        e.status_code()
    })?;
    tracing::info!("[Api] Purged {} annotation(s) older than {} days", removed, days);
    Ok(Json(json!({ "removed": removed })))
}
