//! Router Assembly

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;

use crate::backend::realtime::handle_ws_upgrade;
use crate::backend::routes::api_routes::configure_api_routes;
use crate::backend::server::AppState;

pub fn create_router(state: AppState) -> Router {
    let router = Router::new().route("/ws", get(handle_ws_upgrade));
    let router = configure_api_routes(router);
    router
        .fallback(|| async { (StatusCode::NOT_FOUND, "Not Found") })
        .with_state(state)
}
