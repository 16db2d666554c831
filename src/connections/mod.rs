//! Connection registry: descriptors, persisted artifacts, and the scaffolding lifecycle.

mod pg;
mod registry;
mod store;

pub use pg::{ensure_database_exists, PgConnectionStore};
pub use registry::ConnectionRegistry;
pub use store::{ConnectionStore, MemoryConnectionStore, StoredConnection};

use crate::case::to_field_ident;
use crate::endpoints::EndpointDescriptor;
use crate::error::AppError;
use crate::schema::DatabaseKind;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MAX_NAME_LEN: usize = 63;

/// Operator request to scaffold an API over one database.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDescriptor {
    pub name: String,
    pub connection_string: String,
    pub database_kind: String,
    pub api_route_prefix: String,
    #[serde(default)]
    pub generate_procedure_layer: bool,
}

/// Lifecycle of one connection. Attempt outcomes are `ConnectionError`, `Connected`,
/// `CompilationError` and `Available`; `Active` and `IntegrityError` describe the load step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Connecting,
    ConnectionError,
    Connected,
    Scaffolding,
    CompilationError,
    Available,
    IntegrityError,
    Active,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddConnectionOutcome {
    pub state: ConnectionState,
    pub messages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<Uuid>,
}

impl AddConnectionOutcome {
    fn failed(state: ConnectionState, messages: Vec<String>) -> Self {
        AddConnectionOutcome {
            state,
            messages,
            connection_id: None,
        }
    }
}

/// Persisted artifacts of one `Available` connection.
#[derive(Clone, Debug)]
pub struct ConnectionRecord {
    pub id: Uuid,
    pub name: String,
    /// Generated package and load-context name.
    pub module: String,
    pub connection_string: String,
    pub database_kind: DatabaseKind,
    pub route_prefix: String,
    pub generate_procedure_layer: bool,
    pub binary: Vec<u8>,
    pub debug_symbols: Vec<u8>,
    pub source_archive: Vec<u8>,
    pub sha256: String,
    pub endpoints: Vec<EndpointDescriptor>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSummary {
    pub id: Uuid,
    pub name: String,
    pub database_kind: DatabaseKind,
    pub route_prefix: String,
    pub sha256: String,
    pub state: ConnectionState,
    pub endpoint_count: usize,
    pub created_at: DateTime<Utc>,
}

/// A descriptor that passed validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidDescriptor {
    pub name: String,
    pub module: String,
    pub connection_string: String,
    pub database_kind: DatabaseKind,
    pub route_prefix: String,
    pub generate_procedure_layer: bool,
}

const PREFIX_PATTERN: &str = r"^[a-z0-9][a-z0-9_-]*$";

/// Route prefixes that would shadow the admin and common routes.
const RESERVED_PREFIXES: &[&str] = &["connections", "health", "ready", "version"];

pub fn validate(descriptor: &ConnectionDescriptor) -> Result<ValidDescriptor, AppError> {
    let name = descriptor.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("name must not be empty".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::Validation(format!(
            "name must be at most {} characters",
            MAX_NAME_LEN
        )));
    }
    if descriptor.connection_string.trim().is_empty() {
        return Err(AppError::Validation("connectionString must not be empty".into()));
    }
    let database_kind: DatabaseKind = descriptor
        .database_kind
        .parse()
        .map_err(|e: crate::error::PipelineError| AppError::Validation(e.to_string()))?;
    let route_prefix = descriptor.api_route_prefix.trim().trim_matches('/').to_string();
    let re = Regex::new(PREFIX_PATTERN).map_err(|e| AppError::Internal(format!("prefix pattern: {}", e)))?;
    if !re.is_match(&route_prefix) {
        return Err(AppError::Validation(format!(
            "apiRoutePrefix '{}' must match {}",
            descriptor.api_route_prefix, PREFIX_PATTERN
        )));
    }
    if RESERVED_PREFIXES.contains(&route_prefix.as_str()) {
        return Err(AppError::Validation(format!(
            "apiRoutePrefix '{}' is reserved",
            route_prefix
        )));
    }
    Ok(ValidDescriptor {
        name: name.to_string(),
        module: to_field_ident(name),
        connection_string: descriptor.connection_string.clone(),
        database_kind,
        route_prefix,
        generate_procedure_layer: descriptor.generate_procedure_layer,
    })
}
