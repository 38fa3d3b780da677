//! # Market API
//!
//! HTTP server for user balances and the item price catalogue.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  .env → AppConfig → tracing                                             │
//! │      │                                                                  │
//! │      ▼                                                                  │
//! │  PgPool (market-db)   Redis ConnectionManager   reqwest client          │
//! │      │                                                                  │
//! │      ▼                                                                  │
//! │  axum::serve(/api/v1, TraceLayer, TimeoutLayer)                         │
//! │      │                                                                  │
//! │      ▼  SIGINT / SIGTERM                                                │
//! │  stop accepting, drain in-flight requests                               │
//! │      ├── drained             → close pool, exit 0                       │
//! │      └── GRACE_CLOSE_DELAY   → force exit                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::future::IntoFuture;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use market_api::services::{ItemsService, RedisCache, SkinportClient, UsersService};
use market_api::routes::with_middleware;
use market_api::{router, AppConfig, AppState};
use market_db::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!("Starting Market API server...");
    info!(
        port = config.port,
        database = ?config.database,
        redis = %config.redis_url(),
        "Configuration loaded"
    );

    // Connect to database
    let db = Database::new(config.database.clone())
        .await
        .context("failed to connect to PostgreSQL")?;
    info!("Connected to PostgreSQL");

    // Connect to Redis
    let cache = RedisCache::connect(&config.redis_url())
        .await
        .context("failed to connect to Redis")?;

    let pricing = SkinportClient::new(config.skinport_api_url.clone(), config.skinport_timeout)?;

    // Create shared state
    let state = Arc::new(AppState {
        users: UsersService::new(db.clone()),
        items: ItemsService::new(
            Arc::new(pricing),
            Arc::new(cache),
            config.skinport_cache_ttl,
        ),
        request_cache_ttl: config.request_cache_ttl,
    });

    let app = with_middleware(router(state), config.request_timeout);

    // Build server address
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Starting HTTP server");

    let (closing_tx, mut closing_rx) = watch::channel(false);
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = closing_tx.send(true);
    });

    let grace = config.grace_close_delay;
    let deadline = async move {
        if closing_rx.wait_for(|closing| *closing).await.is_ok() {
            tokio::time::sleep(grace).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = server.into_future() => result?,
        _ = deadline => warn!(?grace, "Forcing shutdown due to timeout"),
    }

    db.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
