//! Schema introspection: read a database catalog into a normalized `DatabaseModel`.
//! Catalog queries return rows ordered by (schema, object, ordinal); grouping relies on that order.

mod assemble;
mod group;
mod mysql;
mod postgres;

pub use group::group_sorted;

use crate::error::PipelineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Schemas that never contribute user objects.
pub(crate) const SYSTEM_SCHEMAS: &[&str] = &[
    "pg_catalog",
    "information_schema",
    "pg_toast",
    "mysql",
    "performance_schema",
    "sys",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    Postgres,
    Mysql,
}

impl DatabaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseKind::Postgres => "postgres",
            DatabaseKind::Mysql => "mysql",
        }
    }
}

impl std::fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatabaseKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(DatabaseKind::Postgres),
            "mysql" | "mariadb" => Ok(DatabaseKind::Mysql),
            other => Err(PipelineError::UnsupportedDatabaseKind(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDef {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referenced_schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referenced_table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referenced_column: Option<String>,
    pub ordinal: u32,
    pub has_default: bool,
    pub is_auto_generated: bool,
}

impl ColumnDef {
    /// Plain column with no key or default information.
    pub fn new(name: &str, data_type: &str, nullable: bool, ordinal: u32) -> Self {
        ColumnDef {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable,
            is_primary_key: false,
            is_foreign_key: false,
            referenced_schema: None,
            referenced_table: None,
            referenced_column: None,
            ordinal,
            has_default: false,
            is_auto_generated: false,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.nullable = false;
        self
    }

    pub fn auto_generated(mut self) -> Self {
        self.is_auto_generated = true;
        self.has_default = true;
        self
    }

    pub fn references(mut self, schema: &str, table: &str, column: &str) -> Self {
        self.is_foreign_key = true;
        self.referenced_schema = Some(schema.to_string());
        self.referenced_table = Some(table.to_string());
        self.referenced_column = Some(column.to_string());
        self
    }
}

/// A table or a view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationDef {
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

pub type TableDef = RelationDef;
pub type ViewDef = RelationDef;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDef {
    pub name: String,
    pub data_type: String,
    pub length: Option<i64>,
    pub precision: Option<i64>,
    pub scale: Option<i64>,
    pub order: u32,
    pub is_output: bool,
    pub is_nullable: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutineKind {
    Procedure,
    Function,
}

/// Result of the best-effort output-shape pass for one routine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "camelCase")]
pub enum OutputProbe {
    Columns(Vec<ColumnDef>),
    NoResultSet,
    Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineDef {
    pub schema: String,
    pub name: String,
    pub kind: RoutineKind,
    pub parameters: Vec<ParameterDef>,
    pub output: OutputProbe,
}

pub type ProcedureDef = RoutineDef;
pub type FunctionDef = RoutineDef;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseModel {
    pub tables: Vec<TableDef>,
    pub views: Vec<ViewDef>,
    pub procedures: Vec<ProcedureDef>,
    pub functions: Vec<FunctionDef>,
}

#[derive(Clone, Debug)]
pub struct IntrospectOptions {
    pub timeout: Duration,
    /// Permit probes that execute a routine inside a rolled-back transaction.
    pub probe_execute: bool,
}

impl Default for IntrospectOptions {
    fn default() -> Self {
        IntrospectOptions {
            timeout: Duration::from_secs(30),
            probe_execute: false,
        }
    }
}

/// Connect and read the full catalog. The whole extraction runs under `options.timeout`.
pub async fn extract_schema(
    kind: DatabaseKind,
    connection_string: &str,
    options: &IntrospectOptions,
) -> Result<DatabaseModel, PipelineError> {
    tracing::info!(kind = %kind, "introspecting schema");
    let work = async {
        match kind {
            DatabaseKind::Postgres => postgres::extract(connection_string, options).await,
            DatabaseKind::Mysql => mysql::extract(connection_string, options).await,
        }
    };
    let model = tokio::time::timeout(options.timeout, work)
        .await
        .map_err(|_| {
            PipelineError::Connectivity(format!(
                "schema introspection timed out after {}s",
                options.timeout.as_secs()
            ))
        })??;
    tracing::info!(
        kind = %kind,
        tables = model.tables.len(),
        views = model.views.len(),
        procedures = model.procedures.len(),
        functions = model.functions.len(),
        "schema introspected"
    );
    Ok(model)
}

/// Classify a sqlx error raised while connecting.
pub(crate) fn connect_error(e: sqlx::Error) -> PipelineError {
    PipelineError::Connectivity(e.to_string())
}

/// Classify a sqlx error raised by a catalog query. Transport failures stay connectivity errors.
pub(crate) fn query_error(e: sqlx::Error) -> PipelineError {
    match e {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed => PipelineError::Connectivity(e.to_string()),
        other => PipelineError::SchemaQuery(other.to_string()),
    }
}

/// Seam for the connection registry; the live implementation talks to the target database.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    async fn extract(
        &self,
        kind: DatabaseKind,
        connection_string: &str,
    ) -> Result<DatabaseModel, PipelineError>;
}

#[derive(Clone, Debug, Default)]
pub struct LiveIntrospector {
    pub options: IntrospectOptions,
}

impl LiveIntrospector {
    pub fn new(options: IntrospectOptions) -> Self {
        LiveIntrospector { options }
    }
}

#[async_trait]
impl SchemaSource for LiveIntrospector {
    async fn extract(
        &self,
        kind: DatabaseKind,
        connection_string: &str,
    ) -> Result<DatabaseModel, PipelineError> {
        extract_schema(kind, connection_string, &self.options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kind_aliases() {
        assert_eq!("PostgreSQL".parse::<DatabaseKind>().unwrap(), DatabaseKind::Postgres);
        assert_eq!("pg".parse::<DatabaseKind>().unwrap(), DatabaseKind::Postgres);
        assert_eq!("mariadb".parse::<DatabaseKind>().unwrap(), DatabaseKind::Mysql);
    }

    #[test]
    fn unknown_kind_is_unsupported() {
        let err = "oracle".parse::<DatabaseKind>().unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedDatabaseKind(k) if k == "oracle"));
    }

    #[test]
    fn probe_serializes_with_status_tag() {
        let v = serde_json::to_value(OutputProbe::Failed("boom".into())).unwrap();
        assert_eq!(v, serde_json::json!({"status": "failed", "detail": "boom"}));
        let v = serde_json::to_value(OutputProbe::NoResultSet).unwrap();
        assert_eq!(v, serde_json::json!({"status": "noResultSet"}));
    }

    #[test]
    fn io_errors_are_connectivity() {
        let io = sqlx::Error::Io(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"));
        assert!(matches!(query_error(io), PipelineError::Connectivity(_)));
        assert!(matches!(
            query_error(sqlx::Error::ColumnNotFound("x".into())),
            PipelineError::SchemaQuery(_)
        ));
    }
}
