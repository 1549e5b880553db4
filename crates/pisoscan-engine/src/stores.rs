//! Collaborator seams the orchestrator drives.
//!
//! The engine owns none of the storage or delivery machinery — it talks to
//! a catalog store, a run store, a config store, and an alert-matching
//! collaborator through these traits. Production wiring lives in
//! `pisoscan-db` / the server; tests substitute in-memory implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use pisoscan_core::{Listing, RunCounters, ScraperConfig, ScraperRun, Source};

/// The persisted listing catalog, keyed by `(external_id, source)`.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn find_by_natural_key(
        &self,
        external_id: &str,
        source: Source,
    ) -> anyhow::Result<Option<Listing>>;

    /// Insert-or-update by natural key; returns the stored row (with its
    /// persistent id).
    async fn upsert(&self, listing: Listing) -> anyhow::Result<Listing>;

    /// Append one price observation. Entries are append-only and ordered by
    /// `recorded_at`.
    async fn append_price_history(
        &self,
        listing_id: Uuid,
        price: Decimal,
        recorded_at: DateTime<Utc>,
    ) -> anyhow::Result<()>;
}

/// Run-record bookkeeping.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Creates a RUNNING run — unless one already exists, in which case
    /// `None` is returned and nothing is created. The check-and-create must
    /// be atomic; two simultaneous callers must not both get a run.
    async fn try_create_run(
        &self,
        filters_snapshot: serde_json::Value,
    ) -> anyhow::Result<Option<ScraperRun>>;

    async fn running_run_exists(&self) -> anyhow::Result<bool>;

    async fn complete_run(&self, run_id: Uuid, counters: &RunCounters) -> anyhow::Result<()>;

    async fn fail_run(
        &self,
        run_id: Uuid,
        message: &str,
        details: Option<&str>,
    ) -> anyhow::Result<()>;

    /// Records one source's contribution (or failure) within a run.
    async fn record_source_result(
        &self,
        run_id: Uuid,
        source: Source,
        listings_found: u32,
        error_message: Option<&str>,
    ) -> anyhow::Result<()>;
}

/// Read access to the persisted [`ScraperConfig`].
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn load(&self) -> anyhow::Result<ScraperConfig>;
}

/// Invoked after a completed run with the window start; matches new
/// listings against saved alerts and delivers notifications. The transport
/// lives outside the engine.
#[async_trait]
pub trait AlertNotifier: Send + Sync {
    async fn notify_new_matches(&self, since: DateTime<Utc>) -> anyhow::Result<()>;
}

/// Alert collaborator that only logs the window it was handed. Used where
/// no delivery transport is wired up.
pub struct LogAlertNotifier;

#[async_trait]
impl AlertNotifier for LogAlertNotifier {
    async fn notify_new_matches(&self, since: DateTime<Utc>) -> anyhow::Result<()> {
        tracing::info!(%since, "alert matching window closed; no notifier transport configured");
        Ok(())
    }
}
