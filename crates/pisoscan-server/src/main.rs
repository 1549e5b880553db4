mod api;
mod scheduler;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use pisoscan_db::{PgCatalogStore, PgConfigStore, PgRunStore};
use pisoscan_engine::{LogAlertNotifier, Orchestrator};
use pisoscan_scraper::ScraperStack;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = pisoscan_core::AppConfig::from_env()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = pisoscan_db::PoolConfig::from_app_config(&config);
    let pool = pisoscan_db::connect_pool(&config.database_url, pool_config).await?;
    pisoscan_db::run_migrations(&pool).await?;

    // A crash mid-run leaves a RUNNING row behind that would block every
    // future run; clear sufficiently old ones before scheduling anything.
    let swept = pisoscan_db::fail_stale_runs(&pool, config.stale_run_max_age_hours).await?;
    if swept > 0 {
        tracing::warn!(swept, "failed orphaned RUNNING runs at startup");
    }

    let stack = ScraperStack::from_config(&config)?;
    let browser = Arc::clone(&stack.browser);
    let orchestrator = Arc::new(Orchestrator::new(
        stack.sources,
        Arc::new(PgCatalogStore::new(pool.clone())),
        Arc::new(PgRunStore::new(pool.clone())),
        Arc::new(PgConfigStore::new(pool.clone())),
        Arc::new(LogAlertNotifier),
    ));

    let _scheduler =
        scheduler::build_scheduler(Arc::clone(&orchestrator), &config.scraper_cron).await?;

    let app = api::build_app(api::AppState { pool, orchestrator });
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The browser process must not outlive us.
    browser.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
