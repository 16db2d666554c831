//! Shared application state for all routes.

use crate::connections::ConnectionRegistry;
use crate::runtime::ModuleProxy;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub proxy: ModuleProxy,
    /// Host database; `/ready` reports degraded when it cannot be reached.
    pub pool: Option<PgPool>,
    pub max_body_bytes: usize,
}
