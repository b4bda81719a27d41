mod cache;
mod config;
mod db;
mod errors;
mod models;
mod query;
mod rbac;
mod routes;
mod service;
mod state;
mod store;
#[cfg(test)]
mod testing;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cache::{CacheBackend, RedisCache};
use crate::config::Config;
use crate::db::create_pool;
use crate::routes::build_router;
use crate::state::{AppState, Settings};
use crate::store::{DocumentStore, PgStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Roster API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    let store: Arc<dyn DocumentStore> = Arc::new(PgStore::new(pool));

    // Initialize Redis (connects on first use)
    let redis = redis::Client::open(config.redis_url.clone())?;
    let cache: Arc<dyn CacheBackend> = Arc::new(RedisCache::new(redis, config.cache_timeout));
    info!("Redis client initialized");

    let state = AppState::new(store, cache, Settings::from_config(&config));
    info!(
        "RBAC ready (max page size {}, disclosure {:?})",
        state.aggregator.max_page_size(),
        state.disclosure
    );

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
