//! Integrity-checked loading of compiled modules into per-connection load contexts.

mod process;

pub use process::{ModuleProcess, CONNECTION_STRING_ENV, LISTEN_ENV};

use crate::error::PipelineError;
use crate::integrity;
use crate::manifest::{Manifest, FORMAT_VERSION};
use crate::runtime::{RouteRegistry, ServiceContainer};
use crate::settings::Settings;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct LoadRequest {
    /// Connection (and load context) name.
    pub name: String,
    pub prefix: String,
    pub binary: Vec<u8>,
    pub expected_hash: String,
    pub connection_string: String,
}

#[derive(Clone, Debug)]
pub struct LoadedModule {
    pub name: String,
    pub manifest: Manifest,
    pub upstream: String,
    pub routes: usize,
}

pub struct ModuleLoader {
    runtime_dir: PathBuf,
    startup_timeout: Duration,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    contexts: Mutex<HashMap<String, ModuleProcess>>,
    routes: Arc<RouteRegistry>,
    services: Arc<ServiceContainer>,
}

impl ModuleLoader {
    pub fn new(
        runtime_dir: impl Into<PathBuf>,
        startup_timeout: Duration,
        routes: Arc<RouteRegistry>,
        services: Arc<ServiceContainer>,
    ) -> Self {
        ModuleLoader {
            runtime_dir: runtime_dir.into(),
            startup_timeout,
            locks: Mutex::new(HashMap::new()),
            contexts: Mutex::new(HashMap::new()),
            routes,
            services,
        }
    }

    pub fn from_settings(settings: &Settings, routes: Arc<RouteRegistry>, services: Arc<ServiceContainer>) -> Self {
        Self::new(
            settings.runtime_dir.clone(),
            settings.module_startup_timeout,
            routes,
            services,
        )
    }

    pub fn routes(&self) -> &Arc<RouteRegistry> {
        &self.routes
    }

    pub fn services(&self) -> &Arc<ServiceContainer> {
        &self.services
    }

    pub fn is_active(&self, name: &str) -> bool {
        let contexts = self.contexts.lock().unwrap_or_else(|e| e.into_inner());
        contexts.contains_key(name)
    }

    fn lock_for(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(name.to_string()).or_default().clone()
    }

    fn take_context(&self, name: &str) -> Option<ModuleProcess> {
        let mut contexts = self.contexts.lock().unwrap_or_else(|e| e.into_inner());
        contexts.remove(name)
    }

    /// Verify, instantiate and register a module. Loads of the same name are serialized.
    ///
    /// The integrity check runs before anything from `req.binary` is written or executed;
    /// on mismatch the current context (if any) is left untouched.
    pub async fn load(&self, req: LoadRequest) -> Result<LoadedModule, PipelineError> {
        let lock = self.lock_for(&req.name);
        let _guard = lock.lock().await;

        if let Err(e) = integrity::verify(&req.binary, &req.expected_hash) {
            tracing::error!(connection = %req.name, error = %e, "refusing to load module: integrity mismatch");
            return Err(e);
        }

        self.release(&req.name).await;

        let hash = integrity::seal(&req.binary);
        let executable = process::materialize(&self.runtime_dir, &req.name, &hash, &req.binary).await?;
        let loaded = self.start(&req, &executable).await;
        if let Err(e) = &loaded {
            tracing::error!(connection = %req.name, error = %e, "module load failed; connection left inactive");
            if let Some(dir) = executable.parent() {
                process::remove_dir(dir).await;
            }
        }
        loaded
    }

    async fn start(&self, req: &LoadRequest, executable: &std::path::Path) -> Result<LoadedModule, PipelineError> {
        let manifest = process::register(executable, self.startup_timeout).await?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(PipelineError::Load(format!(
                "manifest format {} is not supported (expected {})",
                manifest.format_version, FORMAT_VERSION
            )));
        }

        let child = ModuleProcess::spawn(
            &req.name,
            executable,
            &req.connection_string,
            self.startup_timeout,
        )
        .await?;
        let upstream = child.upstream();

        let services = self.services.register(&req.name, &manifest);
        let routes = self.routes.register(
            &req.name,
            &req.prefix,
            &upstream,
            manifest
                .controllers
                .iter()
                .flat_map(|c| c.actions.iter())
                .map(|a| (a.method.as_str(), a.route.as_str())),
        );
        tracing::info!(
            connection = %req.name,
            upstream = %upstream,
            pid = ?child.id(),
            services,
            routes,
            "module active"
        );
        {
            let mut contexts = self.contexts.lock().unwrap_or_else(|e| e.into_inner());
            contexts.insert(req.name.clone(), child);
        }
        Ok(LoadedModule {
            name: req.name.clone(),
            manifest,
            upstream,
            routes,
        })
    }

    /// Remove routes and services, then stop the child and delete its runtime directory.
    async fn release(&self, name: &str) {
        let routes = self.routes.remove_connection(name);
        self.services.remove(name);
        if let Some(child) = self.take_context(name) {
            tracing::info!(connection = %name, routes, "releasing load context");
            child.release().await;
        }
    }

    /// Release the load context of `name`. Returns whether one was active.
    pub async fn unload(&self, name: &str) -> bool {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;
        let active = self.is_active(name);
        self.release(name).await;
        active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader(dir: &std::path::Path) -> ModuleLoader {
        ModuleLoader::new(
            dir,
            Duration::from_secs(10),
            Arc::new(RouteRegistry::new()),
            Arc::new(ServiceContainer::new()),
        )
    }

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("dynapi-loader-{}-{}", tag, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn tampered_binary_is_rejected_before_anything_runs() {
        let dir = temp_dir("tamper");
        let loader = loader(&dir);
        let mut binary = b"#!/bin/sh\necho should-never-run\n".to_vec();
        let hash = integrity::seal(&binary);
        if let Some(last) = binary.last_mut() {
            *last ^= 0x01;
        }

        let err = loader
            .load(LoadRequest {
                name: "shop".into(),
                prefix: "shop".into(),
                binary,
                expected_hash: hash,
                connection_string: "postgres://localhost/shop".into(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Integrity { .. }));
        assert!(loader.routes().routes_for("shop").is_empty());
        assert!(loader.services().services("shop").is_empty());
        assert!(!loader.is_active("shop"));
        assert!(!dir.join("shop").exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[cfg(unix)]
    fn fake_module() -> Vec<u8> {
        let manifest = r#"{"module":"shop","formatVersion":1,"databaseKind":"postgres","controllers":[{"name":"CustomerController","service":"CustomerService","lifetime":"scoped","actions":[{"name":"list_items","method":"GET","route":"/customers"},{"name":"get_item","method":"GET","route":"/customers/:id"}]},{"name":"TopOrdersController","service":"TopOrdersService","lifetime":"singleton","actions":[{"name":"execute","method":"POST","route":"/procedures/top_orders"}]}]}"#;
        format!(
            "#!/bin/sh\nif [ \"$1\" = \"--register\" ]; then\n  echo '{}'\n  exit 0\nfi\necho \"LISTENING 127.0.0.1:9\"\nexec sleep 30\n",
            manifest
        )
        .into_bytes()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn loads_registers_and_unloads() {
        use crate::manifest::ServiceLifetime;
        use crate::runtime::Resolution;

        let dir = temp_dir("fake");
        let loader = loader(&dir);
        let binary = fake_module();
        let hash = integrity::seal(&binary);

        let loaded = loader
            .load(LoadRequest {
                name: "shop".into(),
                prefix: "shop".into(),
                binary,
                expected_hash: hash.clone(),
                connection_string: "postgres://localhost/shop".into(),
            })
            .await
            .unwrap();

        assert_eq!(loaded.routes, 3);
        assert_eq!(loaded.upstream, "http://127.0.0.1:9");
        assert!(loader.is_active("shop"));
        assert!(dir.join("shop").join(&hash[..16]).join("module").exists());
        assert_eq!(loader.services().count("shop", ServiceLifetime::Singleton), 1);
        assert_eq!(loader.services().count("shop", ServiceLifetime::Scoped), 1);
        assert!(matches!(
            loader.routes().resolve("GET", "/shop/customers/4"),
            Resolution::Matched(_)
        ));

        assert!(loader.unload("shop").await);
        assert!(!loader.is_active("shop"));
        assert!(loader.routes().is_empty());
        assert!(!dir.join("shop").join(&hash[..16]).exists());
        assert!(!loader.unload("shop").await);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn silent_module_fails_to_load() {
        let dir = temp_dir("silent");
        let loader = ModuleLoader::new(
            &dir,
            Duration::from_millis(500),
            Arc::new(RouteRegistry::new()),
            Arc::new(ServiceContainer::new()),
        );
        let binary = b"#!/bin/sh\nexit 3\n".to_vec();
        let hash = integrity::seal(&binary);
        let err = loader
            .load(LoadRequest {
                name: "crm".into(),
                prefix: "crm".into(),
                binary,
                expected_hash: hash,
                connection_string: String::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Load(_)));
        assert!(!loader.is_active("crm"));
        assert!(loader.routes().is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }
}
