use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use contacts_api::{app, config::Config, middleware, services::user_cache};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load().context("failed to load configuration")?;

    middleware::logging::init_logging(&config.logging)?;
    middleware::init_metrics()?;

    info!("Starting Contacts API v{}", env!("CARGO_PKG_VERSION"));

    let pool = persistence::db::create_pool(&config.database)
        .await
        .context("failed to connect to the database")?;

    info!("Running database migrations...");
    sqlx::migrate!("../persistence/src/migrations")
        .run(&pool)
        .await?;
    info!("Migrations completed");

    let addr = config.socket_addr()?;
    let state = app::AppState::new(config, pool)?;

    if let Some(cache) = &state.user_cache {
        let ttl = Duration::from_secs(state.config.cache.user_ttl_secs.max(1));
        user_cache::spawn_purge_task(cache.clone(), ttl);
    }

    if let Some(limiter) = &state.rate_limiter {
        middleware::spawn_eviction_task(
            limiter.clone(),
            Duration::from_secs(60),
            middleware::LIMITER_IDLE_TIMEOUT,
        );
    }

    let app = app::router(state);

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
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

    info!("Shutdown signal received");
}
