//! Admin handlers: add, list, inspect, reload and delete connections.

use crate::connections::{ConnectionDescriptor, ConnectionState};
use crate::error::AppError;
use crate::response::{success_many, success_one, success_one_ok};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

fn parse_id(id: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(id).map_err(|_| AppError::BadRequest(format!("invalid connection id '{}'", id)))
}

/// POST /connections: 201 when a module was compiled, 422 when the attempt failed.
pub async fn add_connection(
    State(state): State<AppState>,
    Json(descriptor): Json<ConnectionDescriptor>,
) -> Result<Response, AppError> {
    let outcome = state.registry.add_connection(&descriptor).await?;
    let status = match outcome.state {
        ConnectionState::Available => StatusCode::CREATED,
        ConnectionState::ConnectionError | ConnectionState::CompilationError => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::OK,
    };
    Ok(success_one(status, outcome).into_response())
}

pub async fn list_connections(State(state): State<AppState>) -> Result<Response, AppError> {
    let summaries = state.registry.list_connections().await?;
    Ok(success_many(summaries).into_response())
}

pub async fn get_connection(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, AppError> {
    let summary = state.registry.get_connection(parse_id(&id)?).await?;
    Ok(success_one_ok(summary).into_response())
}

pub async fn delete_connection(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, AppError> {
    let deleted = state.registry.delete_connection(parse_id(&id)?).await?;
    Ok(success_one_ok(serde_json::json!({ "deletedId": deleted })).into_response())
}

pub async fn get_schema(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, AppError> {
    let model = state.registry.get_schema(parse_id(&id)?).await?;
    Ok(success_one_ok(model).into_response())
}

pub async fn get_endpoints(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, AppError> {
    let endpoints = state.registry.get_endpoints(parse_id(&id)?).await?;
    Ok(success_many(endpoints).into_response())
}

/// GET /connections/:id/source: the generated package as a zip.
pub async fn get_source_archive(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, AppError> {
    let (module, bytes) = state.registry.get_source_archive(parse_id(&id)?).await?;
    let disposition = format!("attachment; filename=\"{}-source.zip\"", module);
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// GET /connections/:id/openapi: plain OpenAPI document, not enveloped.
pub async fn get_openapi(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, AppError> {
    let doc = state.registry.get_openapi(parse_id(&id)?).await?;
    Ok(Json(doc).into_response())
}

pub async fn reload_connection(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, AppError> {
    let summary = state.registry.reload_connection(parse_id(&id)?).await?;
    Ok(success_one_ok(summary).into_response())
}
