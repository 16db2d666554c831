//! Per-connection service registrations declared by loaded modules.

use crate::manifest::{Manifest, ServiceLifetime};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescriptor {
    pub service: String,
    pub controller: String,
    pub lifetime: ServiceLifetime,
}

#[derive(Debug, Default)]
pub struct ServiceContainer {
    by_connection: RwLock<HashMap<String, Vec<ServiceDescriptor>>>,
}

impl ServiceContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the registrations of `connection` with the services its manifest declares.
    pub fn register(&self, connection: &str, manifest: &Manifest) -> usize {
        let services: Vec<ServiceDescriptor> = manifest
            .controllers
            .iter()
            .map(|c| ServiceDescriptor {
                service: c.service.clone(),
                controller: c.name.clone(),
                lifetime: c.lifetime,
            })
            .collect();
        let count = services.len();
        let mut map = self.by_connection.write().unwrap_or_else(|e| e.into_inner());
        map.insert(connection.to_string(), services);
        count
    }

    pub fn remove(&self, connection: &str) -> Option<Vec<ServiceDescriptor>> {
        let mut map = self.by_connection.write().unwrap_or_else(|e| e.into_inner());
        map.remove(connection)
    }

    pub fn services(&self, connection: &str) -> Vec<ServiceDescriptor> {
        let map = self.by_connection.read().unwrap_or_else(|e| e.into_inner());
        map.get(connection).cloned().unwrap_or_default()
    }

    pub fn count(&self, connection: &str, lifetime: ServiceLifetime) -> usize {
        let map = self.by_connection.read().unwrap_or_else(|e| e.into_inner());
        map.get(connection)
            .map(|s| s.iter().filter(|d| d.lifetime == lifetime).count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ControllerEntry;
    use std::collections::BTreeMap;

    fn manifest() -> Manifest {
        let controller = |name: &str, lifetime| ControllerEntry {
            name: format!("{}Controller", name),
            service: format!("{}Service", name),
            lifetime,
            actions: vec![],
        };
        Manifest {
            module: "shop".into(),
            format_version: 1,
            database_kind: "postgres".into(),
            controllers: vec![
                controller("Customer", ServiceLifetime::Scoped),
                controller("TopOrders", ServiceLifetime::Singleton),
            ],
            types: BTreeMap::new(),
        }
    }

    #[test]
    fn lifetimes_follow_manifest() {
        let c = ServiceContainer::new();
        assert_eq!(c.register("shop", &manifest()), 2);
        assert_eq!(c.count("shop", ServiceLifetime::Singleton), 1);
        assert_eq!(c.count("shop", ServiceLifetime::Scoped), 1);
        assert_eq!(c.remove("shop").map(|s| s.len()), Some(2));
        assert!(c.services("shop").is_empty());
    }
}
