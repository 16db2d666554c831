//! Connection administration routes.

use crate::handlers::connection::{
    add_connection, delete_connection, get_connection, get_endpoints, get_openapi, get_schema, get_source_archive,
    list_connections, reload_connection,
};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn connection_routes(state: AppState) -> Router {
    Router::new()
        .route("/connections", post(add_connection).get(list_connections))
        .route("/connections/:id", get(get_connection).delete(delete_connection))
        .route("/connections/:id/schema", get(get_schema))
        .route("/connections/:id/endpoints", get(get_endpoints))
        .route("/connections/:id/source", get(get_source_archive))
        .route("/connections/:id/openapi", get(get_openapi))
        .route("/connections/:id/reload", post(reload_connection))
        .with_state(state)
}
