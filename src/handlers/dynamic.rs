//! Catch-all for API paths owned by loaded modules.

use crate::error::AppError;
use crate::runtime::Resolution;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{OriginalUri, State},
    http::Request,
    response::Response,
};

pub const API_ROOT: &str = "/api/v1";

/// Resolve the request against the live route table and proxy it to the owning module.
pub async fn dispatch(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    req: Request<Body>,
) -> Result<Response, AppError> {
    let full = uri.path();
    let path = full.strip_prefix(API_ROOT).unwrap_or(full);
    let method = req.method().clone();
    match state.registry.routes().resolve(method.as_str(), path) {
        Resolution::Matched(target) => {
            tracing::debug!(connection = %target.connection, method = %method, path = %path, "dispatching");
            state.proxy.forward(&target.upstream, &target.module_path, req).await
        }
        Resolution::MethodNotAllowed => Err(AppError::MethodNotAllowed(format!("{} {}", method, path))),
        Resolution::NotFound => Err(AppError::NotFound(format!("no route for {} {}", method, path))),
    }
}
