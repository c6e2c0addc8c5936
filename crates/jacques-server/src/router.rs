use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api;
use crate::state::AppState;

/// REST surface, served on the main TCP port.
pub fn build_rest_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .merge(api::sessions::routes())
        .merge(api::archive::routes())
        .merge(api::projects::routes())
        .merge(api::config::routes());

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// WebSocket surface, served on its own port.
pub fn build_ws_router(state: AppState) -> Router {
    api::ws::routes().with_state(state)
}
