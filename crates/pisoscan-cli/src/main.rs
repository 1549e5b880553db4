//! Manual driving of the scraper without the HTTP server: full runs,
//! single-source runs, migrations, and a status peek.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use sqlx::PgPool;

use pisoscan_db::{PgCatalogStore, PgConfigStore, PgRunStore};
use pisoscan_engine::{LogAlertNotifier, Orchestrator, RunOutcome};
use pisoscan_scraper::ScraperStack;

#[derive(Debug, Parser)]
#[command(name = "pisoscan-cli")]
#[command(about = "pisoscan command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one full scraping cycle (respects the enabled flag and the
    /// single-flight guard, records a run).
    Run,
    /// Scrape one source by name without run bookkeeping.
    RunSource { source: String },
    /// Apply pending database migrations.
    Migrate,
    /// Show whether a run is in progress and the most recent runs.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = pisoscan_core::AppConfig::from_env()?;
    let pool = pisoscan_db::connect_pool(
        &config.database_url,
        pisoscan_db::PoolConfig::from_app_config(&config),
    )
    .await?;

    match cli.command {
        Commands::Migrate => {
            pisoscan_db::run_migrations(&pool).await?;
            println!("migrations applied");
        }
        Commands::Status => {
            let is_running = pisoscan_db::running_run_exists(&pool).await?;
            println!("running: {is_running}");
            for run in pisoscan_db::list_runs(&pool, 5).await? {
                println!(
                    "{} {} started={} total={} new={} updated={} price_changes={}",
                    run.id,
                    run.status,
                    run.started_at,
                    run.counters.total_found,
                    run.counters.new,
                    run.counters.updated,
                    run.counters.price_changes,
                );
            }
        }
        Commands::Run => {
            pisoscan_db::run_migrations(&pool).await?;
            let swept = pisoscan_db::fail_stale_runs(&pool, config.stale_run_max_age_hours).await?;
            if swept > 0 {
                tracing::warn!(swept, "failed orphaned RUNNING runs");
            }

            let (orchestrator, stack) = build_orchestrator(&config, &pool)?;
            let outcome = orchestrator.run().await;
            stack.browser.shutdown();

            match outcome {
                RunOutcome::Completed(counters) => println!(
                    "completed: total={} new={} updated={} price_changes={}",
                    counters.total_found, counters.new, counters.updated, counters.price_changes
                ),
                RunOutcome::Disabled => println!("scraper is disabled"),
                RunOutcome::AlreadyRunning => println!("a run is already in progress"),
                RunOutcome::Failed => anyhow::bail!("run failed; see the run record for details"),
            }
        }
        Commands::RunSource { source } => {
            let (orchestrator, stack) = build_orchestrator(&config, &pool)?;
            let result = orchestrator.run_single_source(&source).await;
            stack.browser.shutdown();
            let persisted = result?;
            println!("persisted {persisted} listings from {source}");
        }
    }

    Ok(())
}

fn build_orchestrator(
    config: &pisoscan_core::AppConfig,
    pool: &PgPool,
) -> anyhow::Result<(Orchestrator, ScraperStack)> {
    let stack = ScraperStack::from_config(config)?;
    let orchestrator = Orchestrator::new(
        stack.sources.clone(),
        Arc::new(PgCatalogStore::new(pool.clone())),
        Arc::new(PgRunStore::new(pool.clone())),
        Arc::new(PgConfigStore::new(pool.clone())),
        Arc::new(LogAlertNotifier),
    );
    Ok((orchestrator, stack))
}
