//! The scraping run loop.
//!
//! One run: resolve active sources, scrape each sequentially (they share
//! the single-permit rate limiter and the one browser process), filter,
//! reconcile into the catalog, and finalize a run record. Failures are
//! contained at the narrowest scope that can absorb them: an element, a
//! page, a listing write, a source — only an error outside all of those
//! fails the run, and even that never propagates to the caller.

use std::sync::Arc;

use chrono::Utc;

use pisoscan_core::{passes_filters, RawListing, RunCounters, ScraperConfig};
use pisoscan_scraper::SourceScraper;

use crate::reconcile::{reconcile, ChangeKind};
use crate::stores::{AlertNotifier, CatalogStore, ConfigStore, RunStore};

/// Longest error message stored on a failed run; full details go to the
/// separate details column.
const ERROR_MESSAGE_CAP: usize = 500;

/// Summary of one `run()` invocation, for callers that want to log or
/// expose it. The authoritative record is the persisted run row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// `enabled = false`; nothing was created.
    Disabled,
    /// Another run was already RUNNING; nothing was created.
    AlreadyRunning,
    Completed(RunCounters),
    Failed,
}

pub struct Orchestrator {
    sources: Vec<Arc<dyn SourceScraper>>,
    catalog: Arc<dyn CatalogStore>,
    runs: Arc<dyn RunStore>,
    config: Arc<dyn ConfigStore>,
    alerts: Arc<dyn AlertNotifier>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        sources: Vec<Arc<dyn SourceScraper>>,
        catalog: Arc<dyn CatalogStore>,
        runs: Arc<dyn RunStore>,
        config: Arc<dyn ConfigStore>,
        alerts: Arc<dyn AlertNotifier>,
    ) -> Self {
        Self {
            sources,
            catalog,
            runs,
            config,
            alerts,
        }
    }

    /// Executes one orchestration cycle. Never returns an error: every
    /// failure is either contained inside the run or recorded on the run
    /// record, and scheduled callers keep running regardless.
    pub async fn run(&self) -> RunOutcome {
        let config = match self.config.load().await {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(error = %e, "failed to load scraper config; no run created");
                return RunOutcome::Failed;
            }
        };

        if !config.enabled {
            tracing::info!("scraper is disabled; skipping run");
            return RunOutcome::Disabled;
        }

        let run = match self.runs.try_create_run(config.filters_snapshot()).await {
            Ok(Some(run)) => run,
            Ok(None) => {
                tracing::warn!("scraper already running; skipping");
                return RunOutcome::AlreadyRunning;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to create run record");
                return RunOutcome::Failed;
            }
        };
        tracing::info!(run_id = %run.id, "started scraper run");

        match self.execute(&run.id, &config).await {
            Ok(counters) => {
                if let Err(e) = self.runs.complete_run(run.id, &counters).await {
                    tracing::error!(run_id = %run.id, error = %e, "failed to finalize run record");
                }
                tracing::info!(
                    run_id = %run.id,
                    total = counters.total_found,
                    new = counters.new,
                    updated = counters.updated,
                    price_changes = counters.price_changes,
                    "scraping completed"
                );

                // A notifier failure is logged; the run stays COMPLETED.
                if let Err(e) = self.alerts.notify_new_matches(run.started_at).await {
                    tracing::error!(error = %e, "alert matching failed");
                }

                RunOutcome::Completed(counters)
            }
            Err(e) => {
                let message = truncate_chars(&format!("{e:#}"), ERROR_MESSAGE_CAP);
                let details = format!("{e:?}");
                tracing::error!(run_id = %run.id, error = %e, "scraper run failed");
                if let Err(fail_err) = self.runs.fail_run(run.id, &message, Some(&details)).await {
                    tracing::error!(run_id = %run.id, error = %fail_err, "failed to record run failure");
                }
                RunOutcome::Failed
            }
        }
    }

    /// Steps 4–6 of the run: scrape, filter, reconcile, count.
    async fn execute(
        &self,
        run_id: &uuid::Uuid,
        config: &ScraperConfig,
    ) -> anyhow::Result<RunCounters> {
        let active = self.resolve_sources(config);
        if active.is_empty() {
            anyhow::bail!("no active sources configured");
        }

        let mut counters = RunCounters::default();

        for scraper in active {
            let source = scraper.source();
            tracing::info!(%source, "starting source");

            // One source blowing up must not abort the loop: record a zero
            // contribution and move on.
            match scraper
                .scrape(&config.cities, &config.operation_types)
                .await
            {
                Ok(listings) => {
                    let found = u32::try_from(listings.len()).unwrap_or(u32::MAX);
                    counters.total_found += found;
                    counters.per_source.insert(source, found);
                    if let Err(e) = self
                        .runs
                        .record_source_result(*run_id, source, found, None)
                        .await
                    {
                        tracing::warn!(%source, error = %e, "failed to record source result");
                    }

                    for raw in &listings {
                        if !passes_filters(raw, config) {
                            continue;
                        }
                        match self.upsert_listing(raw).await {
                            Ok(ChangeKind::New) => counters.new += 1,
                            Ok(ChangeKind::Updated { price_changed }) => {
                                counters.updated += 1;
                                if price_changed {
                                    counters.price_changes += 1;
                                }
                            }
                            Err(e) => {
                                tracing::error!(
                                    external_id = %raw.external_id,
                                    %source,
                                    error = %e,
                                    "failed to persist listing; continuing"
                                );
                            }
                        }
                    }
                    tracing::info!(%source, count = found, "source completed");
                }
                Err(e) => {
                    tracing::error!(%source, error = %e, "source failed; continuing with remaining sources");
                    counters.per_source.insert(source, 0);
                    if let Err(record_err) = self
                        .runs
                        .record_source_result(*run_id, source, 0, Some(&e.to_string()))
                        .await
                    {
                        tracing::warn!(%source, error = %record_err, "failed to record source failure");
                    }
                }
            }
        }

        Ok(counters)
    }

    /// The manual path: scrape one source by name, filter, and persist —
    /// no run record, no alert matching.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown source name or a failed scrape; a
    /// single listing failing to persist is logged and skipped like in a
    /// full run.
    pub async fn run_single_source(&self, source_name: &str) -> anyhow::Result<u32> {
        let config = self.config.load().await?;

        let Some(scraper) = self
            .sources
            .iter()
            .find(|s| s.source().as_str().eq_ignore_ascii_case(source_name))
        else {
            anyhow::bail!("unknown scraper source: {source_name}");
        };

        let source = scraper.source();
        tracing::info!(%source, "running single source");
        let listings = scraper
            .scrape(&config.cities, &config.operation_types)
            .await?;

        let mut persisted = 0u32;
        for raw in &listings {
            if !passes_filters(raw, &config) {
                continue;
            }
            match self.upsert_listing(raw).await {
                Ok(_) => persisted += 1,
                Err(e) => {
                    tracing::error!(external_id = %raw.external_id, error = %e, "failed to persist listing");
                }
            }
        }

        tracing::info!(%source, found = listings.len(), persisted, "single source completed");
        Ok(persisted)
    }

    /// Reconciles one raw listing into the catalog and appends price
    /// history when a price was first seen or changed.
    async fn upsert_listing(&self, raw: &RawListing) -> anyhow::Result<ChangeKind> {
        let existing = self
            .catalog
            .find_by_natural_key(&raw.external_id, raw.source)
            .await?;
        let now = Utc::now();

        let (next, kind) = reconcile(existing.as_ref(), raw, now);
        let saved = self.catalog.upsert(next).await?;

        let record_price = match kind {
            ChangeKind::New => raw.price.is_some(),
            ChangeKind::Updated { price_changed } => price_changed,
        };
        if record_price {
            if let Some(price) = raw.price {
                self.catalog
                    .append_price_history(saved.id, price, now)
                    .await?;
            }
        }

        Ok(kind)
    }

    /// Maps configured source names to scrapers, skipping unknown names
    /// with a warning.
    fn resolve_sources(&self, config: &ScraperConfig) -> Vec<Arc<dyn SourceScraper>> {
        let mut active = Vec::new();
        for name in &config.sources {
            match self
                .sources
                .iter()
                .find(|s| s.source().as_str().eq_ignore_ascii_case(name))
            {
                Some(scraper) => active.push(Arc::clone(scraper)),
                None => tracing::warn!(%name, "unknown scraper source in config; skipping"),
            }
        }
        active
    }
}

/// Char-boundary-safe truncation for stored error messages.
fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
