use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use api::{
    AppState, config::ServerConfig, create_router, repositories::CatalogRepository,
};
use auth::{
    Authenticator, JwtConfig, JwtService, RateLimiter, RateLimiterConfig,
    repositories::PgCredentialStore,
};
use common::{
    database::{DatabaseConfig, health_check, init_pool},
    logging::FileLogSink,
};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;

    info!("Starting catalog API service");

    let server_config = ServerConfig::load()?;
    let jwt_config = JwtConfig::from_env()?;

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    if health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    let (log_sink, log_guard) = FileLogSink::open(&server_config.log_dir)?;

    let rate_limiter = RateLimiter::new(RateLimiterConfig::from_env());
    let purge_task = {
        let rate_limiter = rate_limiter.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(PURGE_INTERVAL);
            loop {
                interval.tick().await;
                rate_limiter.purge_expired().await;
            }
        })
    };

    let state = AppState {
        authenticator: Authenticator::new(
            Arc::new(PgCredentialStore::new(pool.clone())),
            JwtService::new(jwt_config),
        ),
        rate_limiter,
        catalog: Arc::new(CatalogRepository::new(pool.clone())),
        log_sink: Arc::new(log_sink),
    };

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], server_config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Catalog API listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    purge_task.abort();
    pool.close().await;
    drop(log_guard);
    info!("Catalog API stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
