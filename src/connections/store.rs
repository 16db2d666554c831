//! Persistence seam for connection records.

use super::ConnectionRecord;
use crate::endpoints::EndpointDescriptor;
use crate::error::AppError;
use crate::schema::DatabaseKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Indexed metadata of a record, without the artifact blobs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredConnection {
    pub id: Uuid,
    pub name: String,
    pub module: String,
    pub database_kind: DatabaseKind,
    pub route_prefix: String,
    pub sha256: String,
    pub endpoint_count: usize,
    pub created_at: DateTime<Utc>,
}

impl From<&ConnectionRecord> for StoredConnection {
    fn from(r: &ConnectionRecord) -> Self {
        StoredConnection {
            id: r.id,
            name: r.name.clone(),
            module: r.module.clone(),
            database_kind: r.database_kind,
            route_prefix: r.route_prefix.clone(),
            sha256: r.sha256.clone(),
            endpoint_count: r.endpoints.len(),
            created_at: r.created_at,
        }
    }
}

#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Insert a new record. Name, module and route prefix are unique; a clash is `Conflict`.
    async fn insert(&self, record: &ConnectionRecord) -> Result<(), AppError>;
    async fn get(&self, id: Uuid) -> Result<Option<ConnectionRecord>, AppError>;
    /// Ordered by creation time.
    async fn list(&self) -> Result<Vec<StoredConnection>, AppError>;
    async fn delete(&self, id: Uuid) -> Result<bool, AppError>;
    async fn update_endpoints(&self, id: Uuid, endpoints: &[EndpointDescriptor]) -> Result<(), AppError>;
}

/// Returns a conflict message when `candidate` clashes with `existing`.
pub(crate) fn clash(existing: &StoredConnection, name: &str, module: &str, prefix: &str) -> Option<String> {
    if existing.name.eq_ignore_ascii_case(name) || existing.module == module {
        Some(format!("a connection named '{}' already exists", existing.name))
    } else if existing.route_prefix == prefix {
        Some(format!("route prefix '{}' is already used by '{}'", prefix, existing.name))
    } else {
        None
    }
}

/// Process-local store for tests and throwaway hosts.
#[derive(Debug, Default)]
pub struct MemoryConnectionStore {
    records: RwLock<BTreeMap<Uuid, ConnectionRecord>>,
}

impl MemoryConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConnectionStore for MemoryConnectionStore {
    async fn insert(&self, record: &ConnectionRecord) -> Result<(), AppError> {
        let mut records = self.records.write().await;
        for existing in records.values() {
            if let Some(msg) = clash(&existing.into(), &record.name, &record.module, &record.route_prefix) {
                return Err(AppError::Conflict(msg));
            }
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ConnectionRecord>, AppError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<StoredConnection>, AppError> {
        let records = self.records.read().await;
        let mut out: Vec<StoredConnection> = records.values().map(StoredConnection::from).collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        Ok(out)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(self.records.write().await.remove(&id).is_some())
    }

    async fn update_endpoints(&self, id: Uuid, endpoints: &[EndpointDescriptor]) -> Result<(), AppError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("connection {}", id)))?;
        record.endpoints = endpoints.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, prefix: &str) -> ConnectionRecord {
        ConnectionRecord {
            id: Uuid::new_v4(),
            name: name.into(),
            module: crate::case::to_field_ident(name),
            connection_string: "postgres://localhost/x".into(),
            database_kind: DatabaseKind::Postgres,
            route_prefix: prefix.into(),
            generate_procedure_layer: false,
            binary: vec![1, 2, 3],
            debug_symbols: vec![],
            source_archive: vec![],
            sha256: crate::integrity::seal(&[1, 2, 3]),
            endpoints: vec![],
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn memory_store_enforces_uniqueness() {
        let store = MemoryConnectionStore::new();
        let shop = record("shop", "shop");
        store.insert(&shop).await.unwrap();
        assert!(matches!(store.insert(&record("SHOP", "other")).await, Err(AppError::Conflict(_))));
        assert!(matches!(store.insert(&record("crm", "shop")).await, Err(AppError::Conflict(_))));
        store.insert(&record("crm", "crm")).await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(store.get(shop.id).await.unwrap().unwrap().binary, vec![1, 2, 3]);
        assert!(store.delete(shop.id).await.unwrap());
        assert!(!store.delete(shop.id).await.unwrap());
        assert!(store.get(shop.id).await.unwrap().is_none());
    }
}
