//! Host-side runtime for loaded modules: service registrations, the live route table, and the
//! proxy that carries requests to module processes.

pub mod proxy;
pub mod routes;
pub mod services;

pub use proxy::ModuleProxy;
pub use routes::{full_template, Resolution, RouteEntry, RouteMatch, RouteRegistry};
pub use services::{ServiceContainer, ServiceDescriptor};
