//! Background job scheduler.
//!
//! Registers the recurring scraper job at server startup. The cron
//! expression comes from process configuration; the per-run enabled switch
//! is checked inside `Orchestrator::run`, so a disabled scraper still ticks
//! but does nothing.

use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use pisoscan_engine::Orchestrator;

/// Builds and starts the scheduler. The returned handle must be kept alive
/// for the lifetime of the process — dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// the cron expression is invalid, or the scheduler fails to start.
pub async fn build_scheduler(
    orchestrator: Arc<Orchestrator>,
    cron: &str,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async(cron, move |_uuid, _lock| {
        let orchestrator = Arc::clone(&orchestrator);
        Box::pin(async move {
            tracing::info!("scheduler: starting scraper run");
            let outcome = orchestrator.run().await;
            tracing::info!(?outcome, "scheduler: scraper run finished");
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;
    Ok(scheduler)
}
