//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid setting {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// One compiler error, positioned in a generated source file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub code: String,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{} [{}] {}", self.file, self.line, self.column, self.code, self.message)
    }
}

/// Failures of the scaffolding pipeline, one variant per stage.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("cannot reach database: {0}")]
    Connectivity(String),
    #[error("unsupported database kind: {0}")]
    UnsupportedDatabaseKind(String),
    #[error("schema query failed: {0}")]
    SchemaQuery(String),
    #[error("generation failed for {target}: {message}")]
    Generation { target: String, message: String },
    #[error("compilation failed with {} error(s)", diagnostics.len())]
    Compilation { diagnostics: Vec<Diagnostic> },
    #[error("integrity check failed: expected {expected}, got {actual}")]
    Integrity { expected: String, actual: String },
    #[error("module load failed: {0}")]
    Load(String),
}

impl PipelineError {
    /// Stable code used in API bodies and logs.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Connectivity(_) => "connectivity_error",
            PipelineError::UnsupportedDatabaseKind(_) | PipelineError::SchemaQuery(_) => {
                "schema_extraction_error"
            }
            PipelineError::Generation { .. } => "generation_error",
            PipelineError::Compilation { .. } => "compilation_error",
            PipelineError::Integrity { .. } => "integrity_error",
            PipelineError::Load(_) => "load_error",
        }
    }

    /// Operator-facing messages. Generation errors are internal defects and stay generic.
    pub fn messages(&self) -> Vec<String> {
        match self {
            PipelineError::Compilation { diagnostics } => {
                diagnostics.iter().map(ToString::to_string).collect()
            }
            PipelineError::Generation { .. } => {
                vec!["internal error while generating source; see server logs".to_string()]
            }
            other => vec![other.to_string()],
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),
    #[error("upstream: {0}")]
    Upstream(String),
    #[error("internal: {0}")]
    Internal(String),
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::Pipeline(e) => {
                let status = match e {
                    PipelineError::Connectivity(_) => StatusCode::BAD_GATEWAY,
                    PipelineError::UnsupportedDatabaseKind(_) => StatusCode::BAD_REQUEST,
                    PipelineError::Compilation { .. } | PipelineError::SchemaQuery(_) => {
                        StatusCode::UNPROCESSABLE_ENTITY
                    }
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.code())
            }
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            AppError::Db(e) => {
                if let sqlx::Error::RowNotFound = e {
                    (StatusCode::NOT_FOUND, "not_found")
                } else {
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
                }
            }
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::MethodNotAllowed(_) => (StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed"),
            AppError::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };
        let details = match &self {
            AppError::Pipeline(e) => Some(serde_json::json!(e.messages())),
            _ => None,
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details,
            },
        };
        (status, Json(body)).into_response()
    }
}
