//! Fallback that carries unmatched API requests to loaded modules.

use crate::handlers::dynamic::dispatch;
use crate::state::AppState;
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;

pub fn dynamic_routes(state: AppState) -> Router {
    let limit = state.max_body_bytes;
    Router::new()
        .fallback(dispatch)
        .layer(RequestBodyLimitLayer::new(limit))
        .with_state(state)
}
