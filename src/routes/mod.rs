//! Router assembly.

mod common;
mod connection;
mod dynamic;

pub use common::common_routes;
pub use connection::connection_routes;
pub use dynamic::dynamic_routes;

use crate::handlers::API_ROOT;
use crate::state::AppState;
use axum::Router;

/// Common routes at the root; admin and module routes under `/api/v1`.
pub fn app(state: AppState) -> Router {
    let api = connection_routes(state.clone()).merge(dynamic_routes(state.clone()));
    Router::new()
        .merge(common_routes(state))
        .nest(API_ROOT, api)
}
