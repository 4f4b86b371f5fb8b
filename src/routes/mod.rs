pub mod admin;
pub mod collections;
pub mod events;
pub mod health;
pub mod items;
pub mod scores;

use axum::extract::DefaultBodyLimit;
use axum::Router;

use crate::middleware::request_id;
use crate::state::AppState;

/// Maximum request body size: 256 KiB. Event payloads are a few hundred bytes;
/// the largest body is a full scoring config.
const MAX_BODY_SIZE: usize = 256 * 1024;

pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .nest("/items", items::router())
        .nest("/events", events::router())
        .nest("/scores", scores::router())
        .nest("/collections", collections::router())
        .nest("/admin", admin::router())
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE));

    Router::new()
        .nest("/api", api_routes)
        .nest("/health", health::router())
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .with_state(state)
}
