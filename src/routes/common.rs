//! Common routes: health, readiness, version.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyBody {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<&'static str>,
    connections: usize,
    routes: usize,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyBody>) {
    let database = match &state.pool {
        Some(pool) => match sqlx::query("SELECT 1").fetch_optional(pool).await {
            Ok(_) => Some("ok"),
            Err(_) => Some("unavailable"),
        },
        None => None,
    };
    let connections = state
        .registry
        .list_connections()
        .await
        .map(|c| c.len())
        .unwrap_or(0);
    let body = ReadyBody {
        status: if database == Some("unavailable") { "degraded" } else { "ok" },
        database,
        connections,
        routes: state.registry.routes().len(),
    };
    let status = if body.status == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "referenceSet": crate::compiler::REFERENCE_SET_VERSION,
        "manifestFormat": crate::manifest::FORMAT_VERSION,
    }))
}

/// GET /health, GET /ready (host DB check), GET /version.
pub fn common_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/version", get(version))
        .with_state(state)
}
