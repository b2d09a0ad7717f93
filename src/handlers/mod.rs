use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub mod items;

/// Read-only dashboard API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/items", get(items::list_items))
        .route("/api/items/{id}/stats", get(items::get_item_stats))
        .route("/api/items/{id}/candles", get(items::get_item_candles))
        .route("/api/items/{id}/history", get(items::get_item_history))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
