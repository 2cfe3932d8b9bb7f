//! Shared Application State
//!
//! One `AppState` is built at startup and cloned into every handler. All
//! fields are cheap clones (Arc handles and a pooled store).

use std::sync::Arc;

use axum::extract::FromRef;

use crate::backend::realtime::Registry;
use crate::backend::rooms::RoomManager;
use crate::backend::store::AnnotationStore;

#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<RoomManager>,
    pub registry: Arc<Registry>,
    pub store: AnnotationStore,
}

impl FromRef<AppState> for Arc<RoomManager> {
    fn from_ref(state: &AppState) -> Self {
        state.rooms.clone()
    }
}

impl FromRef<AppState> for Arc<Registry> {
    fn from_ref(state: &AppState) -> Self {
        state.registry.clone()
    }
}

impl FromRef<AppState> for AnnotationStore {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}
