mod analytics;
mod api;
mod config;
mod export;
mod ingest;
mod models;
mod storage;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;

use config::{Config, DatabaseBackend};
use export::{ExportPipeline, MemoryExportCache, RateLimiter, TokenBucketLimiter};
use storage::{PostgresStorage, SqliteStorage, Storage};

/// How often idle rate-limiter buckets are swept, and how long a bucket may
/// sit untouched before it goes. An idle bucket is full again, so dropping
/// it is lossless.
const LIMITER_PRUNE_INTERVAL: Duration = Duration::from_secs(600);
const LIMITER_MAX_IDLE: Duration = Duration::from_secs(2 * 3600);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pollit=info,tower_http=info".into()),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    // Initialize storage
    let storage: Arc<dyn Storage> = match config.database.backend {
        DatabaseBackend::Sqlite => {
            info!("Using SQLite storage: {}", config.database.url);
            Arc::new(SqliteStorage::from_config(&config.database).await?)
        }
        DatabaseBackend::Postgres => {
            info!("Using PostgreSQL storage: {}", config.database.url);
            Arc::new(PostgresStorage::from_config(&config.database).await?)
        }
    };

    // Initialize database
    info!("Initializing database...");
    storage.init().await?;
    info!("Database initialized successfully");

    // Export pipeline state: in-memory cache plus the general and raw
    // rate limiters. Everything here is per-instance state.
    let export_cache = Arc::new(MemoryExportCache::new(
        Duration::from_secs(config.export.cache_ttl_secs),
        config.export.cache_max_entries,
    ));
    let general_limiter = Arc::new(TokenBucketLimiter::per_hour(
        config.export.rate_limit_per_hour,
    ));
    let raw_limiter = Arc::new(TokenBucketLimiter::per_hour(
        config.export.raw_rate_limit_per_hour,
    ));

    let exports = Arc::new(ExportPipeline::new(
        Arc::clone(&storage),
        export_cache,
        Arc::clone(&general_limiter) as Arc<dyn RateLimiter>,
        Arc::clone(&raw_limiter) as Arc<dyn RateLimiter>,
        config.export.max_raw_rows as i64,
    ));

    // Sweep idle limiter buckets in the background
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(LIMITER_PRUNE_INTERVAL);
        loop {
            interval.tick().await;
            general_limiter.prune_idle(LIMITER_MAX_IDLE);
            raw_limiter.prune_idle(LIMITER_MAX_IDLE);
        }
    });

    // Create routers
    let api_router = api::create_api_router(Arc::clone(&storage), exports);
    let ingest_router = ingest::create_ingest_router(Arc::clone(&storage));

    // Start API server
    let api_addr = format!("{}:{}", config.api_server.host, config.api_server.port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr).await?;
    info!("🚀 API server listening on http://{}", api_addr);
    info!("   - API endpoints available at http://{}/api/...", api_addr);

    // Start ingest server
    let ingest_addr = format!(
        "{}:{}",
        config.ingest_server.host, config.ingest_server.port
    );
    let ingest_listener = tokio::net::TcpListener::bind(&ingest_addr).await?;
    info!("🚀 Ingest server listening on http://{}", ingest_addr);

    // Run both servers concurrently until a shutdown signal arrives
    tokio::try_join!(
        axum::serve(api_listener, api_router).with_graceful_shutdown(shutdown_signal()),
        axum::serve(ingest_listener, ingest_router).with_graceful_shutdown(shutdown_signal()),
    )?;

    info!("shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C"),
        _ = terminate => info!("received SIGTERM"),
    }
}
