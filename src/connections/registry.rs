use super::store::{clash, ConnectionStore, StoredConnection};
use super::{validate, AddConnectionOutcome, ConnectionDescriptor, ConnectionRecord, ConnectionState, ConnectionSummary};
use crate::codegen::Generator;
use crate::compiler::{Compiler, CompilerOptions, ModuleCompiler, ReferenceSet};
use crate::endpoints::{self, EndpointDescriptor};
use crate::error::{AppError, PipelineError};
use crate::integrity;
use crate::loader::{LoadRequest, ModuleLoader};
use crate::metadata::{map_entities, map_procedures};
use crate::runtime::{RouteRegistry, ServiceContainer};
use crate::schema::{DatabaseModel, IntrospectOptions, LiveIntrospector, SchemaSource};
use crate::settings::Settings;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Owns the scaffolding pipeline for every connection: introspect, map, generate, compile,
/// seal, persist, load.
pub struct ConnectionRegistry {
    store: Arc<dyn ConnectionStore>,
    source: Arc<dyn SchemaSource>,
    generator: Generator,
    compiler: Arc<dyn ModuleCompiler>,
    loader: Arc<ModuleLoader>,
    /// Last failed load per connection, cleared by a successful one.
    load_failures: RwLock<HashMap<Uuid, ConnectionState>>,
}

fn transition(name: &str, state: ConnectionState) {
    tracing::info!(connection = %name, state = ?state, "connection state");
}

impl ConnectionRegistry {
    pub fn new(
        store: Arc<dyn ConnectionStore>,
        source: Arc<dyn SchemaSource>,
        compiler: Arc<dyn ModuleCompiler>,
        loader: Arc<ModuleLoader>,
    ) -> Self {
        ConnectionRegistry {
            store,
            source,
            generator: Generator::default(),
            compiler,
            loader,
            load_failures: RwLock::new(HashMap::new()),
        }
    }

    /// Live introspection, cargo compiler and a fresh route table, all configured from `settings`.
    pub fn from_settings(settings: &Settings, store: Arc<dyn ConnectionStore>) -> Self {
        let source = LiveIntrospector::new(IntrospectOptions {
            timeout: settings.introspection_timeout,
            probe_execute: settings.probe_execute,
        });
        let loader = ModuleLoader::from_settings(
            settings,
            Arc::new(RouteRegistry::new()),
            Arc::new(ServiceContainer::new()),
        );
        Self::new(
            store,
            Arc::new(source),
            Arc::new(Compiler::new(CompilerOptions::from_settings(settings))),
            Arc::new(loader),
        )
    }

    pub fn with_generator(mut self, generator: Generator) -> Self {
        self.generator = generator;
        self
    }

    pub fn loader(&self) -> &Arc<ModuleLoader> {
        &self.loader
    }

    pub fn routes(&self) -> &Arc<RouteRegistry> {
        self.loader.routes()
    }

    async fn ensure_unique(&self, name: &str, module: &str, prefix: &str) -> Result<(), AppError> {
        for existing in self.store.list().await? {
            if let Some(msg) = clash(&existing, name, module, prefix) {
                return Err(AppError::Conflict(msg));
            }
        }
        Ok(())
    }

    /// Run the full pipeline for a new connection. Pipeline outcomes (unreachable database,
    /// compile errors) are returned as states; invalid or clashing descriptors are errors.
    pub async fn add_connection(&self, descriptor: &ConnectionDescriptor) -> Result<AddConnectionOutcome, AppError> {
        let valid = validate(descriptor)?;
        self.ensure_unique(&valid.name, &valid.module, &valid.route_prefix).await?;
        let kind = valid.database_kind;

        transition(&valid.name, ConnectionState::Connecting);
        let model = match self.source.extract(kind, &valid.connection_string).await {
            Ok(model) => model,
            Err(e) => {
                tracing::warn!(connection = %valid.name, error = %e, "schema extraction failed");
                transition(&valid.name, ConnectionState::ConnectionError);
                return Ok(AddConnectionOutcome::failed(ConnectionState::ConnectionError, e.messages()));
            }
        };
        transition(&valid.name, ConnectionState::Connected);

        let entities = map_entities(kind, &model);
        let procedures = if valid.generate_procedure_layer {
            map_procedures(kind, &model)
        } else {
            Vec::new()
        };
        if entities.is_empty() && procedures.is_empty() {
            return Ok(AddConnectionOutcome::failed(
                ConnectionState::Connected,
                vec!["no tables, views or routines to scaffold".to_string()],
            ));
        }

        transition(&valid.name, ConnectionState::Scaffolding);
        let generated = self
            .generator
            .generate(&valid.module, kind, entities, procedures)
            .await
            .map_err(|e| {
                tracing::error!(connection = %valid.name, error = ?e, "source generation failed");
                e
            })?;
        let references = ReferenceSet::standard(kind);
        let artifacts = match self.compiler.compile(&valid.module, &generated.sources, &references).await {
            Ok(artifacts) => artifacts,
            Err(e @ PipelineError::Compilation { .. }) => {
                transition(&valid.name, ConnectionState::CompilationError);
                return Ok(AddConnectionOutcome::failed(ConnectionState::CompilationError, e.messages()));
            }
            Err(e) => return Err(e.into()),
        };

        let sha256 = integrity::seal(&artifacts.binary);
        let endpoints = endpoints::extract(&generated.manifest);
        let record = ConnectionRecord {
            id: Uuid::new_v4(),
            name: valid.name.clone(),
            module: valid.module.clone(),
            connection_string: valid.connection_string.clone(),
            database_kind: kind,
            route_prefix: valid.route_prefix.clone(),
            generate_procedure_layer: valid.generate_procedure_layer,
            binary: artifacts.binary,
            debug_symbols: artifacts.debug_symbols,
            source_archive: artifacts.source_archive,
            sha256,
            endpoints,
            created_at: chrono::Utc::now(),
        };
        self.store.insert(&record).await?;
        transition(&valid.name, ConnectionState::Available);

        let mut messages = vec![format!(
            "module compiled with {} endpoint(s)",
            record.endpoints.len()
        )];
        match self.activate(&record).await {
            Ok(routes) => messages.push(format!("module active with {} route(s)", routes)),
            Err(e) => messages.extend(e.messages()),
        }
        Ok(AddConnectionOutcome {
            state: ConnectionState::Available,
            messages,
            connection_id: Some(record.id),
        })
    }

    /// Load a persisted record and refresh its endpoint catalog from the module's own manifest.
    async fn activate(&self, record: &ConnectionRecord) -> Result<usize, PipelineError> {
        let loaded = self
            .loader
            .load(LoadRequest {
                name: record.module.clone(),
                prefix: record.route_prefix.clone(),
                binary: record.binary.clone(),
                expected_hash: record.sha256.clone(),
                connection_string: record.connection_string.clone(),
            })
            .await;
        let failures = |state: Option<ConnectionState>| {
            let mut map = self.load_failures.write().unwrap_or_else(|e| e.into_inner());
            match state {
                Some(s) => map.insert(record.id, s),
                None => map.remove(&record.id),
            };
        };
        match loaded {
            Ok(loaded) => {
                failures(None);
                transition(&record.name, ConnectionState::Active);
                let catalog = endpoints::extract(&loaded.manifest);
                if let Err(e) = self.store.update_endpoints(record.id, &catalog).await {
                    tracing::warn!(connection = %record.name, error = %e, "cannot refresh endpoint catalog");
                }
                Ok(loaded.routes)
            }
            Err(e) => {
                if matches!(e, PipelineError::Integrity { .. }) {
                    failures(Some(ConnectionState::IntegrityError));
                    transition(&record.name, ConnectionState::IntegrityError);
                } else {
                    failures(None);
                }
                Err(e)
            }
        }
    }

    async fn record(&self, id: Uuid) -> Result<ConnectionRecord, AppError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("connection {}", id)))
    }

    fn summary(&self, stored: StoredConnection) -> ConnectionSummary {
        let state = if self.loader.is_active(&stored.module) {
            ConnectionState::Active
        } else {
            let failures = self.load_failures.read().unwrap_or_else(|e| e.into_inner());
            failures.get(&stored.id).copied().unwrap_or(ConnectionState::Available)
        };
        ConnectionSummary {
            id: stored.id,
            name: stored.name,
            database_kind: stored.database_kind,
            route_prefix: stored.route_prefix,
            sha256: stored.sha256,
            state,
            endpoint_count: stored.endpoint_count,
            created_at: stored.created_at,
        }
    }

    /// Remove the descriptor and its artifacts. Routes already live in this process stay live
    /// until restart.
    pub async fn delete_connection(&self, id: Uuid) -> Result<Uuid, AppError> {
        let record = self.record(id).await?;
        if !self.store.delete(id).await? {
            return Err(AppError::NotFound(format!("connection {}", id)));
        }
        {
            let mut failures = self.load_failures.write().unwrap_or_else(|e| e.into_inner());
            failures.remove(&id);
        }
        if self.loader.is_active(&record.module) {
            tracing::warn!(connection = %record.name, "connection deleted; its routes stay live until restart");
        } else {
            tracing::info!(connection = %record.name, "connection deleted");
        }
        Ok(id)
    }

    pub async fn list_connections(&self) -> Result<Vec<ConnectionSummary>, AppError> {
        let stored = self.store.list().await?;
        Ok(stored.into_iter().map(|s| self.summary(s)).collect())
    }

    pub async fn get_connection(&self, id: Uuid) -> Result<ConnectionSummary, AppError> {
        let record = self.record(id).await?;
        Ok(self.summary(StoredConnection::from(&record)))
    }

    /// Re-introspect the live database behind a connection.
    pub async fn get_schema(&self, id: Uuid) -> Result<DatabaseModel, AppError> {
        let record = self.record(id).await?;
        let model = self
            .source
            .extract(record.database_kind, &record.connection_string)
            .await?;
        Ok(model)
    }

    pub async fn get_endpoints(&self, id: Uuid) -> Result<Vec<EndpointDescriptor>, AppError> {
        Ok(self.record(id).await?.endpoints)
    }

    /// Zip of the generated package, for audit.
    pub async fn get_source_archive(&self, id: Uuid) -> Result<(String, Vec<u8>), AppError> {
        let record = self.record(id).await?;
        Ok((record.module, record.source_archive))
    }

    pub async fn get_openapi(&self, id: Uuid) -> Result<serde_json::Value, AppError> {
        let record = self.record(id).await?;
        Ok(endpoints::openapi_document(
            &record.name,
            &record.route_prefix,
            &record.endpoints,
        ))
    }

    /// Load (or reload) the persisted module of a connection.
    pub async fn reload_connection(&self, id: Uuid) -> Result<ConnectionSummary, AppError> {
        let record = self.record(id).await?;
        self.activate(&record).await?;
        self.get_connection(id).await
    }

    /// Load every persisted connection; used once at start-up. Failures are logged and skipped.
    pub async fn replay(&self) -> Result<usize, AppError> {
        let mut active = 0;
        for stored in self.store.list().await? {
            let record = match self.store.get(stored.id).await? {
                Some(r) => r,
                None => continue,
            };
            match self.activate(&record).await {
                Ok(_) => active += 1,
                Err(e) => tracing::warn!(connection = %record.name, error = %e, "replay skipped connection"),
            }
        }
        tracing::info!(active, "connections replayed");
        Ok(active)
    }
}
