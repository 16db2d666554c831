//! `_sys_connections` persistence in the host Postgres database. The table lives in the
//! schema named by `DYNAPI_SCHEMA` (default `dynapi`); binaries and symbols are zstd-compressed.

use super::store::{ConnectionStore, StoredConnection};
use super::ConnectionRecord;
use crate::endpoints::EndpointDescriptor;
use crate::error::AppError;
use crate::schema::DatabaseKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{ConnectOptions, PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

const TABLE: &str = "_sys_connections";
const ZSTD_LEVEL: i32 = 3;

fn compress(bytes: &[u8]) -> Result<Vec<u8>, AppError> {
    zstd::encode_all(bytes, ZSTD_LEVEL).map_err(|e| AppError::Internal(format!("zstd encode: {}", e)))
}

fn decompress(bytes: &[u8]) -> Result<Vec<u8>, AppError> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    zstd::decode_all(bytes).map_err(|e| AppError::Internal(format!("zstd decode: {}", e)))
}

fn write_error(e: sqlx::Error) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict(format!("connection name or route prefix already in use ({})", db.message()))
        }
        _ => AppError::Db(e),
    }
}

fn parse_kind(value: &str) -> Result<DatabaseKind, AppError> {
    value
        .parse()
        .map_err(|e: crate::error::PipelineError| AppError::Internal(format!("stored record: {}", e)))
}

#[derive(Clone, Debug)]
pub struct PgConnectionStore {
    pool: PgPool,
    schema: String,
}

impl PgConnectionStore {
    /// `schema` must already be a valid identifier (see `Settings::sys_schema`).
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        PgConnectionStore {
            pool,
            schema: schema.into(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn table(&self) -> String {
        format!("{}.{}", self.schema, TABLE)
    }

    /// Create the schema and `_sys_connections` if missing.
    pub async fn ensure_tables(&self) -> Result<(), AppError> {
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", self.schema))
            .execute(&self.pool)
            .await?;
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id UUID PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                module TEXT NOT NULL UNIQUE,
                connection_string TEXT NOT NULL,
                database_kind TEXT NOT NULL,
                route_prefix TEXT NOT NULL UNIQUE,
                generate_procedure_layer BOOLEAN NOT NULL DEFAULT FALSE,
                binary_zst BYTEA NOT NULL,
                debug_symbols_zst BYTEA NOT NULL,
                source_archive BYTEA NOT NULL,
                sha256 TEXT NOT NULL,
                endpoints JSONB NOT NULL DEFAULT '[]'::jsonb,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            self.table()
        );
        sqlx::query(&ddl).execute(&self.pool).await?;
        let index = format!(
            "CREATE INDEX IF NOT EXISTS {}_database_kind_idx ON {} (database_kind)",
            TABLE,
            self.table()
        );
        sqlx::query(&index).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ConnectionStore for PgConnectionStore {
    async fn insert(&self, record: &ConnectionRecord) -> Result<(), AppError> {
        let endpoints = serde_json::to_value(&record.endpoints)
            .map_err(|e| AppError::Internal(format!("endpoint catalog: {}", e)))?;
        sqlx::query(&format!(
            "INSERT INTO {} (id, name, module, connection_string, database_kind, route_prefix, generate_procedure_layer, binary_zst, debug_symbols_zst, source_archive, sha256, endpoints, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
            self.table()
        ))
        .bind(record.id)
        .bind(&record.name)
        .bind(&record.module)
        .bind(&record.connection_string)
        .bind(record.database_kind.as_str())
        .bind(&record.route_prefix)
        .bind(record.generate_procedure_layer)
        .bind(compress(&record.binary)?)
        .bind(compress(&record.debug_symbols)?)
        .bind(&record.source_archive)
        .bind(&record.sha256)
        .bind(endpoints)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ConnectionRecord>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT id, name, module, connection_string, database_kind, route_prefix, generate_procedure_layer, binary_zst, debug_symbols_zst, source_archive, sha256, endpoints, created_at FROM {} WHERE id = $1",
            self.table()
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let kind: String = row.try_get("database_kind")?;
        let binary: Vec<u8> = row.try_get("binary_zst")?;
        let symbols: Vec<u8> = row.try_get("debug_symbols_zst")?;
        let endpoints: serde_json::Value = row.try_get("endpoints")?;
        Ok(Some(ConnectionRecord {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            module: row.try_get("module")?,
            connection_string: row.try_get("connection_string")?,
            database_kind: parse_kind(&kind)?,
            route_prefix: row.try_get("route_prefix")?,
            generate_procedure_layer: row.try_get("generate_procedure_layer")?,
            binary: decompress(&binary)?,
            debug_symbols: decompress(&symbols)?,
            source_archive: row.try_get("source_archive")?,
            sha256: row.try_get("sha256")?,
            endpoints: serde_json::from_value(endpoints)
                .map_err(|e| AppError::Internal(format!("stored endpoint catalog: {}", e)))?,
            created_at: row.try_get("created_at")?,
        }))
    }

    async fn list(&self) -> Result<Vec<StoredConnection>, AppError> {
        let rows: Vec<(Uuid, String, String, String, String, String, i32, DateTime<Utc>)> = sqlx::query_as(&format!(
            "SELECT id, name, module, database_kind, route_prefix, sha256, jsonb_array_length(endpoints), created_at FROM {} ORDER BY created_at, name",
            self.table()
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(id, name, module, kind, route_prefix, sha256, count, created_at)| {
                Ok(StoredConnection {
                    id,
                    name,
                    module,
                    database_kind: parse_kind(&kind)?,
                    route_prefix,
                    sha256,
                    endpoint_count: count.max(0) as usize,
                    created_at,
                })
            })
            .collect()
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = $1", self.table()))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_endpoints(&self, id: Uuid, endpoints: &[EndpointDescriptor]) -> Result<(), AppError> {
        let value = serde_json::to_value(endpoints)
            .map_err(|e| AppError::Internal(format!("endpoint catalog: {}", e)))?;
        let result = sqlx::query(&format!("UPDATE {} SET endpoints = $2 WHERE id = $1", self.table()))
            .bind(id)
            .bind(value)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("connection {}", id)));
        }
        Ok(())
    }
}

/// Ensure the database in `database_url` exists; create it if not. Connects to the
/// default `postgres` database to run CREATE DATABASE. Call before creating the main pool.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = split_database_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| AppError::BadRequest(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating host database");
        sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&db_name)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

/// `postgres://u@h/app?x=1` -> (`postgres://u@h/postgres?x=1`, `app`)
fn split_database_url(url: &str) -> Result<(String, String), AppError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| AppError::BadRequest("DATABASE_URL: no path".into()))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let (db_name, query) = match path_and_query.split_once('?') {
        Some((db, q)) => (db.trim(), format!("?{}", q)),
        None => (path_and_query.trim(), String::new()),
    };
    let base = url.get(..path_start).unwrap_or(url);
    Ok((format!("{}postgres{}", base, query), db_name.to_string()))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
