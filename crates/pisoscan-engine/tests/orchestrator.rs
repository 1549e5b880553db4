//! Orchestrator scenarios over in-memory collaborators.
//!
//! These tests drive the full run loop with stub sources and stores: the
//! single-flight guard, per-source isolation, filter boundaries, upsert
//! idempotence, and the price-history ordering invariant.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use pisoscan_core::{
    Listing, OperationType, RawListing, RunCounters, RunStatus, ScraperConfig, ScraperRun, Source,
};
use pisoscan_engine::{
    AlertNotifier, CatalogStore, ChangeKind, ConfigStore, Orchestrator, RunOutcome, RunStore,
};
use pisoscan_scraper::SourceScraper;

// ---------------------------------------------------------------------------
// In-memory collaborators
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemCatalog {
    listings: Mutex<HashMap<(String, Source), Listing>>,
    history: Mutex<Vec<(Uuid, Decimal, DateTime<Utc>)>>,
}

impl MemCatalog {
    fn listing(&self, external_id: &str, source: Source) -> Option<Listing> {
        self.listings
            .lock()
            .unwrap()
            .get(&(external_id.to_owned(), source))
            .cloned()
    }

    fn history_for(&self, listing_id: Uuid) -> Vec<(Decimal, DateTime<Utc>)> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _, _)| *id == listing_id)
            .map(|(_, price, at)| (*price, *at))
            .collect()
    }

    fn len(&self) -> usize {
        self.listings.lock().unwrap().len()
    }
}

#[async_trait]
impl CatalogStore for MemCatalog {
    async fn find_by_natural_key(
        &self,
        external_id: &str,
        source: Source,
    ) -> anyhow::Result<Option<Listing>> {
        Ok(self.listing(external_id, source))
    }

    async fn upsert(&self, listing: Listing) -> anyhow::Result<Listing> {
        self.listings.lock().unwrap().insert(
            (listing.external_id.clone(), listing.source),
            listing.clone(),
        );
        Ok(listing)
    }

    async fn append_price_history(
        &self,
        listing_id: Uuid,
        price: Decimal,
        recorded_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        self.history
            .lock()
            .unwrap()
            .push((listing_id, price, recorded_at));
        Ok(())
    }
}

#[derive(Default)]
struct MemRuns {
    runs: Mutex<Vec<ScraperRun>>,
    source_results: Mutex<Vec<(Uuid, Source, u32, Option<String>)>>,
}

impl MemRuns {
    fn with_running_run() -> Self {
        let store = Self::default();
        store.runs.lock().unwrap().push(ScraperRun {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running,
            counters: RunCounters::default(),
            error_message: None,
            error_details: None,
            filters_snapshot: serde_json::Value::Null,
        });
        store
    }

    fn run_count(&self) -> usize {
        self.runs.lock().unwrap().len()
    }

    fn latest(&self) -> ScraperRun {
        self.runs.lock().unwrap().last().cloned().expect("a run")
    }
}

#[async_trait]
impl RunStore for MemRuns {
    async fn try_create_run(
        &self,
        filters_snapshot: serde_json::Value,
    ) -> anyhow::Result<Option<ScraperRun>> {
        let mut runs = self.runs.lock().unwrap();
        if runs.iter().any(|r| r.status == RunStatus::Running) {
            return Ok(None);
        }
        let run = ScraperRun {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running,
            counters: RunCounters::default(),
            error_message: None,
            error_details: None,
            filters_snapshot,
        };
        runs.push(run.clone());
        Ok(Some(run))
    }

    async fn running_run_exists(&self) -> anyhow::Result<bool> {
        Ok(self
            .runs
            .lock()
            .unwrap()
            .iter()
            .any(|r| r.status == RunStatus::Running))
    }

    async fn complete_run(&self, run_id: Uuid, counters: &RunCounters) -> anyhow::Result<()> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs
            .iter_mut()
            .find(|r| r.id == run_id)
            .expect("run exists");
        run.status = RunStatus::Completed;
        run.finished_at = Some(Utc::now());
        run.counters = counters.clone();
        Ok(())
    }

    async fn fail_run(
        &self,
        run_id: Uuid,
        message: &str,
        details: Option<&str>,
    ) -> anyhow::Result<()> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs
            .iter_mut()
            .find(|r| r.id == run_id)
            .expect("run exists");
        run.status = RunStatus::Failed;
        run.finished_at = Some(Utc::now());
        run.error_message = Some(message.to_owned());
        run.error_details = details.map(str::to_owned);
        Ok(())
    }

    async fn record_source_result(
        &self,
        run_id: Uuid,
        source: Source,
        listings_found: u32,
        error_message: Option<&str>,
    ) -> anyhow::Result<()> {
        self.source_results.lock().unwrap().push((
            run_id,
            source,
            listings_found,
            error_message.map(str::to_owned),
        ));
        Ok(())
    }
}

struct MemConfig(ScraperConfig);

#[async_trait]
impl ConfigStore for MemConfig {
    async fn load(&self) -> anyhow::Result<ScraperConfig> {
        Ok(self.0.clone())
    }
}

#[derive(Default)]
struct MemAlerts {
    calls: Mutex<Vec<DateTime<Utc>>>,
}

#[async_trait]
impl AlertNotifier for MemAlerts {
    async fn notify_new_matches(&self, since: DateTime<Utc>) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(since);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Stub sources
// ---------------------------------------------------------------------------

struct StubSource {
    source: Source,
    listings: Mutex<Vec<RawListing>>,
    fail: AtomicBool,
}

impl StubSource {
    fn returning(source: Source, listings: Vec<RawListing>) -> Arc<Self> {
        Arc::new(Self {
            source,
            listings: Mutex::new(listings),
            fail: AtomicBool::new(false),
        })
    }

    fn failing(source: Source) -> Arc<Self> {
        let stub = Self::returning(source, Vec::new());
        stub.fail.store(true, Ordering::SeqCst);
        stub
    }

    fn set_listings(&self, listings: Vec<RawListing>) {
        *self.listings.lock().unwrap() = listings;
    }
}

#[async_trait]
impl SourceScraper for StubSource {
    fn source(&self) -> Source {
        self.source
    }

    fn base_url(&self) -> &'static str {
        "https://stub.example"
    }

    async fn scrape(
        &self,
        _cities: &[String],
        _operation_types: &[OperationType],
    ) -> anyhow::Result<Vec<RawListing>> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("simulated source failure");
        }
        Ok(self.listings.lock().unwrap().clone())
    }
}

fn raw_listing(source: Source, external_id: &str, price: i64) -> RawListing {
    let mut listing = RawListing::new(external_id, source);
    listing.title = Some(format!("Piso {external_id}"));
    listing.price = Some(Decimal::from(price));
    listing.operation_type = Some(OperationType::Venta);
    listing.city = Some("Madrid".to_owned());
    listing
}

fn test_config(sources: &[&str]) -> ScraperConfig {
    ScraperConfig {
        cities: vec!["Madrid".to_owned()],
        operation_types: vec![OperationType::Venta],
        sources: sources.iter().map(|s| (*s).to_owned()).collect(),
        ..ScraperConfig::default()
    }
}

struct Harness {
    catalog: Arc<MemCatalog>,
    runs: Arc<MemRuns>,
    alerts: Arc<MemAlerts>,
    orchestrator: Orchestrator,
}

fn harness(
    sources: Vec<Arc<dyn SourceScraper>>,
    config: ScraperConfig,
    runs: Arc<MemRuns>,
) -> Harness {
    let catalog = Arc::new(MemCatalog::default());
    let alerts = Arc::new(MemAlerts::default());
    let orchestrator = Orchestrator::new(
        sources,
        Arc::clone(&catalog) as Arc<dyn CatalogStore>,
        Arc::clone(&runs) as Arc<dyn RunStore>,
        Arc::new(MemConfig(config)),
        Arc::clone(&alerts) as Arc<dyn AlertNotifier>,
    );
    Harness {
        catalog,
        runs,
        alerts,
        orchestrator,
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_and_second_run_classify_changes_like_the_catalog_expects() {
    let stub = StubSource::returning(
        Source::Pisoscom,
        vec![
            raw_listing(Source::Pisoscom, "1", 200_000),
            raw_listing(Source::Pisoscom, "2", 150_000),
        ],
    );
    let h = harness(
        vec![Arc::clone(&stub) as Arc<dyn SourceScraper>],
        test_config(&["PISOSCOM"]),
        Arc::new(MemRuns::default()),
    );

    // First run: both listings are new.
    let outcome = h.orchestrator.run().await;
    let RunOutcome::Completed(counters) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(counters.total_found, 2);
    assert_eq!(counters.new, 2);
    assert_eq!(counters.updated, 0);
    assert_eq!(counters.price_changes, 0);

    // Second run: listing 1 got more expensive, listing 2 is unchanged.
    stub.set_listings(vec![
        raw_listing(Source::Pisoscom, "1", 210_000),
        raw_listing(Source::Pisoscom, "2", 150_000),
    ]);
    let outcome = h.orchestrator.run().await;
    let RunOutcome::Completed(counters) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(counters.new, 0);
    assert_eq!(counters.updated, 2);
    assert_eq!(counters.price_changes, 1);

    // Both runs finalized COMPLETED and the alert window opened twice.
    assert_eq!(h.runs.run_count(), 2);
    assert_eq!(h.runs.latest().status, RunStatus::Completed);
    assert_eq!(h.alerts.calls.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn rescrape_with_identical_price_appends_no_history() {
    let stub = StubSource::returning(
        Source::Pisoscom,
        vec![raw_listing(Source::Pisoscom, "1", 200_000)],
    );
    let h = harness(
        vec![Arc::clone(&stub) as Arc<dyn SourceScraper>],
        test_config(&["PISOSCOM"]),
        Arc::new(MemRuns::default()),
    );

    h.orchestrator.run().await;
    h.orchestrator.run().await;

    let listing = h.catalog.listing("1", Source::Pisoscom).expect("stored");
    let history = h.catalog.history_for(listing.id);
    assert_eq!(history.len(), 1, "identical re-upsert must not append");
    assert_eq!(history[0].0, Decimal::from(200_000));
}

#[tokio::test]
async fn price_change_appends_one_ordered_history_entry() {
    let stub = StubSource::returning(
        Source::Pisoscom,
        vec![raw_listing(Source::Pisoscom, "1", 200_000)],
    );
    let h = harness(
        vec![Arc::clone(&stub) as Arc<dyn SourceScraper>],
        test_config(&["PISOSCOM"]),
        Arc::new(MemRuns::default()),
    );

    h.orchestrator.run().await;
    stub.set_listings(vec![raw_listing(Source::Pisoscom, "1", 210_000)]);
    h.orchestrator.run().await;

    let listing = h.catalog.listing("1", Source::Pisoscom).expect("stored");
    let history = h.catalog.history_for(listing.id);
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].0, Decimal::from(200_000));
    assert_eq!(history[1].0, Decimal::from(210_000));
    assert!(history[0].1 <= history[1].1, "entries ordered by recorded_at");
}

#[tokio::test]
async fn filter_boundary_is_inclusive() {
    let stub = StubSource::returning(
        Source::Pisoscom,
        vec![
            raw_listing(Source::Pisoscom, "at-max", 200_000),
            raw_listing(Source::Pisoscom, "above-max", 200_001),
        ],
    );
    let config = ScraperConfig {
        max_price: Some(Decimal::from(200_000)),
        ..test_config(&["PISOSCOM"])
    };
    let h = harness(
        vec![stub as Arc<dyn SourceScraper>],
        config,
        Arc::new(MemRuns::default()),
    );

    let RunOutcome::Completed(counters) = h.orchestrator.run().await else {
        panic!("expected completion");
    };

    // Both were found, but only the boundary value was persisted.
    assert_eq!(counters.total_found, 2);
    assert_eq!(counters.new, 1);
    assert!(h.catalog.listing("at-max", Source::Pisoscom).is_some());
    assert!(h.catalog.listing("above-max", Source::Pisoscom).is_none());
}

#[tokio::test]
async fn running_run_blocks_new_runs_and_touches_nothing() {
    let stub = StubSource::returning(
        Source::Pisoscom,
        vec![raw_listing(Source::Pisoscom, "1", 200_000)],
    );
    let runs = Arc::new(MemRuns::with_running_run());
    let h = harness(
        vec![stub as Arc<dyn SourceScraper>],
        test_config(&["PISOSCOM"]),
        Arc::clone(&runs),
    );

    let outcome = h.orchestrator.run().await;

    assert_eq!(outcome, RunOutcome::AlreadyRunning);
    assert_eq!(h.runs.run_count(), 1, "no second run record created");
    assert_eq!(h.catalog.len(), 0, "no catalog mutations");
    assert!(h.alerts.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn disabled_config_is_a_no_op() {
    let stub = StubSource::returning(
        Source::Pisoscom,
        vec![raw_listing(Source::Pisoscom, "1", 200_000)],
    );
    let config = ScraperConfig {
        enabled: false,
        ..test_config(&["PISOSCOM"])
    };
    let h = harness(
        vec![stub as Arc<dyn SourceScraper>],
        config,
        Arc::new(MemRuns::default()),
    );

    assert_eq!(h.orchestrator.run().await, RunOutcome::Disabled);
    assert_eq!(h.runs.run_count(), 0);
    assert_eq!(h.catalog.len(), 0);
}

#[tokio::test]
async fn one_failing_source_does_not_abort_the_others() {
    let first = StubSource::returning(
        Source::Pisoscom,
        vec![raw_listing(Source::Pisoscom, "p1", 100_000)],
    );
    let second = StubSource::failing(Source::Fotocasa);
    let third = StubSource::returning(
        Source::Idealista,
        vec![raw_listing(Source::Idealista, "i1", 300_000)],
    );
    let h = harness(
        vec![
            first as Arc<dyn SourceScraper>,
            second as Arc<dyn SourceScraper>,
            third as Arc<dyn SourceScraper>,
        ],
        test_config(&["PISOSCOM", "FOTOCASA", "IDEALISTA"]),
        Arc::new(MemRuns::default()),
    );

    let RunOutcome::Completed(counters) = h.orchestrator.run().await else {
        panic!("a failing source must not fail the run");
    };

    assert_eq!(counters.per_source.get(&Source::Pisoscom), Some(&1));
    assert_eq!(counters.per_source.get(&Source::Fotocasa), Some(&0));
    assert_eq!(counters.per_source.get(&Source::Idealista), Some(&1));
    assert_eq!(counters.new, 2);
    assert_eq!(h.runs.latest().status, RunStatus::Completed);

    // The failed source left an error on its per-source record.
    let results = h.runs.source_results.lock().unwrap();
    let fotocasa = results
        .iter()
        .find(|(_, source, _, _)| *source == Source::Fotocasa)
        .expect("fotocasa result recorded");
    assert!(fotocasa.3.as_deref().unwrap_or("").contains("simulated"));
}

#[tokio::test]
async fn unknown_source_names_are_skipped() {
    let stub = StubSource::returning(
        Source::Pisoscom,
        vec![raw_listing(Source::Pisoscom, "1", 100_000)],
    );
    let h = harness(
        vec![stub as Arc<dyn SourceScraper>],
        test_config(&["PISOSCOM", "HEMNET"]),
        Arc::new(MemRuns::default()),
    );

    let RunOutcome::Completed(counters) = h.orchestrator.run().await else {
        panic!("expected completion");
    };
    assert_eq!(counters.new, 1);
    assert_eq!(counters.per_source.len(), 1);
}

#[tokio::test]
async fn no_resolvable_sources_fails_the_run() {
    let h = harness(
        Vec::new(),
        test_config(&["HEMNET"]),
        Arc::new(MemRuns::default()),
    );

    assert_eq!(h.orchestrator.run().await, RunOutcome::Failed);
    let run = h.runs.latest();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run
        .error_message
        .as_deref()
        .unwrap_or("")
        .contains("no active sources"));
}

#[tokio::test]
async fn run_single_source_persists_without_run_bookkeeping() {
    let stub = StubSource::returning(
        Source::Pisoscom,
        vec![
            raw_listing(Source::Pisoscom, "1", 100_000),
            raw_listing(Source::Pisoscom, "2", 120_000),
        ],
    );
    let h = harness(
        vec![stub as Arc<dyn SourceScraper>],
        test_config(&["PISOSCOM"]),
        Arc::new(MemRuns::default()),
    );

    let persisted = h
        .orchestrator
        .run_single_source("pisoscom")
        .await
        .expect("single source run");

    assert_eq!(persisted, 2);
    assert_eq!(h.catalog.len(), 2);
    assert_eq!(h.runs.run_count(), 0, "no run record for the manual path");
    assert!(h.alerts.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn run_single_source_rejects_unknown_names() {
    let h = harness(
        Vec::new(),
        test_config(&["PISOSCOM"]),
        Arc::new(MemRuns::default()),
    );
    let err = h
        .orchestrator
        .run_single_source("HEMNET")
        .await
        .expect_err("unknown source must error");
    assert!(err.to_string().contains("unknown scraper source"));
}

#[tokio::test]
async fn change_kind_is_exported_for_direct_reconcile_callers() {
    // Compile-time check that the reconcile surface stays public.
    let raw = raw_listing(Source::Pisoscom, "x", 1);
    let (listing, kind) = pisoscan_engine::reconcile(None, &raw, Utc::now());
    assert_eq!(kind, ChangeKind::New);
    assert_eq!(listing.external_id, "x");
}
