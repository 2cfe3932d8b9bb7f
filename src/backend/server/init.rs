//! Application Assembly
//!
//! Builds the store, room manager, and registry, spawns the periodic flush
//! sweep, and wires up the router. Storage is required infrastructure: if
//! the database cannot be opened or migrated, startup fails.

use std::sync::Arc;

use axum::Router;

use crate::backend::error::BackendError;
use crate::backend::realtime::Registry;
use crate::backend::rooms::RoomManager;
use crate::backend::routes::create_router;
use crate::backend::server::config::ServerConfig;
use crate::backend::server::state::AppState;
use crate::backend::store::AnnotationStore;

pub async fn create_app(config: &ServerConfig) -> Result<(Router, AppState), BackendError> {
    tracing::info!("[Startup] Connecting to database at {}", config.database_url);
    let store = AnnotationStore::connect(&config.database_url).await?;

    let rooms = Arc::new(RoomManager::new(store.clone(), config.per_page_target));
    let registry = Arc::new(Registry::new());

    let state = AppState {
        rooms: rooms.clone(),
        registry,
        store: store.clone(),
    };

    spawn_flush_sweep(rooms, store, config.flush_interval);

    let router = create_router(state.clone());
    Ok((router, state))
}

/// Background sweep that flushes dirty rooms on an interval, so a crash
/// between write-throughs loses at most one interval of annotations.
fn spawn_flush_sweep(
    rooms: Arc<RoomManager>,
    store: AnnotationStore,
    period: std::time::Duration,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await; // the first tick completes immediately
        loop {
            interval.tick().await;
            rooms.flush_all().await;
            match store.stats().await {
                Ok(stats) => tracing::info!(
                    "[Sweep] Store: {} annotations across {} channels, {:.2} MB on disk",
                    stats.total_annotations,
                    stats.total_channels,
                    stats.db_size_bytes as f64 / 1024.0 / 1024.0
                ),
                Err(e) => tracing::error!("[Sweep] Failed to read store stats: {}", e),
            }
        }
    });
}
