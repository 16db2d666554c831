//! Forwards API requests to a module process over loopback.

use crate::error::AppError;
use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, Request};
use axum::response::Response;
use std::time::Duration;

/// Connection-scoped headers that must not be forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

fn forwardable(name: &HeaderName) -> bool {
    !HOP_BY_HOP.contains(&name.as_str())
}

fn copy_headers(from: &HeaderMap, to: &mut HeaderMap) {
    for (name, value) in from {
        if forwardable(name) {
            to.append(name.clone(), value.clone());
        }
    }
}

#[derive(Clone, Debug)]
pub struct ModuleProxy {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl ModuleProxy {
    pub fn new(max_body_bytes: usize) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .no_proxy()
            .build()
            .map_err(|e| AppError::Internal(format!("proxy client: {}", e)))?;
        Ok(ModuleProxy { client, max_body_bytes })
    }

    /// Send `req` to `upstream` + `module_path`, keeping method, query, headers and body.
    /// The response body is streamed back.
    pub async fn forward(&self, upstream: &str, module_path: &str, req: Request<Body>) -> Result<Response, AppError> {
        let (parts, body) = req.into_parts();
        let query = parts.uri.query().map(|q| format!("?{}", q)).unwrap_or_default();
        let url = format!("{}{}{}", upstream.trim_end_matches('/'), module_path, query);
        let bytes = axum::body::to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|e| AppError::BadRequest(format!("request body: {}", e)))?;

        let mut headers = HeaderMap::new();
        copy_headers(&parts.headers, &mut headers);
        let upstream_response = self
            .client
            .request(parts.method, &url)
            .headers(headers)
            .body(bytes)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(url = %url, error = %e, "module request failed");
                AppError::Upstream(e.to_string())
            })?;

        let mut response = Response::builder().status(upstream_response.status());
        if let Some(h) = response.headers_mut() {
            copy_headers(upstream_response.headers(), h);
        }
        response
            .body(Body::from_stream(upstream_response.bytes_stream()))
            .map_err(|e| AppError::Internal(e.to_string()))
    }
}
