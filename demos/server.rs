//! Example host: reads settings from env (and `.env`), ensures the host database and `_sys_connections`
//! exist, replays persisted connections, then serves the admin API and every loaded module.

use dynapi_sdk::{app, ensure_database_exists, AppState, ConnectionRegistry, ModuleProxy, PgConnectionStore, Settings};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("dynapi_sdk=info".parse()?))
        .init();

    let settings = Settings::from_env()?;
    ensure_database_exists(&settings.database_url).await?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&settings.database_url)
        .await?;

    let store = PgConnectionStore::new(pool.clone(), settings.sys_schema.clone());
    store.ensure_tables().await?;

    let registry = Arc::new(ConnectionRegistry::from_settings(&settings, Arc::new(store)));
    let active = registry.replay().await?;
    tracing::info!(active, "persisted connections loaded");

    let state = AppState {
        registry,
        proxy: ModuleProxy::new(settings.max_body_bytes)?,
        pool: Some(pool),
        max_body_bytes: settings.max_body_bytes,
    };

    let listener = TcpListener::bind(&settings.bind).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app(state)).await?;
    Ok(())
}
