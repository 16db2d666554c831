//! dynapi SDK: scaffold, compile and serve REST APIs over existing relational databases at runtime.

pub mod case;
pub mod codegen;
pub mod compiler;
pub mod connections;
pub mod dialect;
pub mod endpoints;
pub mod error;
pub mod handlers;
pub mod integrity;
pub mod loader;
pub mod manifest;
pub mod metadata;
pub mod response;
pub mod routes;
pub mod runtime;
pub mod schema;
pub mod settings;
pub mod state;

pub use codegen::{GeneratedModule, Generator, TemplateSet};
pub use compiler::{CompiledArtifacts, Compiler, CompilerOptions, ModuleCompiler, ReferenceSet};
pub use connections::{
    ensure_database_exists, ConnectionDescriptor, ConnectionRegistry, ConnectionState, ConnectionStore,
    ConnectionSummary, MemoryConnectionStore, PgConnectionStore,
};
pub use endpoints::{extract as extract_endpoints, openapi_document, EndpointDescriptor};
pub use error::{AppError, ConfigError, Diagnostic, PipelineError};
pub use integrity::{seal, verify};
pub use loader::{LoadRequest, LoadedModule, ModuleLoader};
pub use manifest::Manifest;
pub use metadata::{map_entities, map_procedures, EntityMetadata, ProcedureMetadata};
pub use routes::{app, common_routes, connection_routes, dynamic_routes};
pub use runtime::{ModuleProxy, RouteRegistry, ServiceContainer};
pub use schema::{extract_schema, DatabaseKind, DatabaseModel, IntrospectOptions, LiveIntrospector, SchemaSource};
pub use settings::Settings;
pub use state::AppState;
