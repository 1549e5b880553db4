//! Postgres implementations of the engine's collaborator traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use pisoscan_core::{Listing, RunCounters, ScraperConfig, ScraperRun, Source};
use pisoscan_engine::{CatalogStore, ConfigStore, RunStore};

#[derive(Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn find_by_natural_key(
        &self,
        external_id: &str,
        source: Source,
    ) -> anyhow::Result<Option<Listing>> {
        Ok(crate::listings::find_by_natural_key(&self.pool, external_id, source).await?)
    }

    async fn upsert(&self, listing: Listing) -> anyhow::Result<Listing> {
        Ok(crate::listings::upsert_listing(&self.pool, &listing).await?)
    }

    async fn append_price_history(
        &self,
        listing_id: Uuid,
        price: Decimal,
        recorded_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        Ok(crate::listings::append_price_history(&self.pool, listing_id, price, recorded_at).await?)
    }
}

#[derive(Clone)]
pub struct PgRunStore {
    pool: PgPool,
}

impl PgRunStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunStore for PgRunStore {
    async fn try_create_run(
        &self,
        filters_snapshot: serde_json::Value,
    ) -> anyhow::Result<Option<ScraperRun>> {
        Ok(crate::scraper_runs::try_create_run(&self.pool, &filters_snapshot).await?)
    }

    async fn running_run_exists(&self) -> anyhow::Result<bool> {
        Ok(crate::scraper_runs::running_run_exists(&self.pool).await?)
    }

    async fn complete_run(&self, run_id: Uuid, counters: &RunCounters) -> anyhow::Result<()> {
        Ok(crate::scraper_runs::complete_run(&self.pool, run_id, counters).await?)
    }

    async fn fail_run(
        &self,
        run_id: Uuid,
        message: &str,
        details: Option<&str>,
    ) -> anyhow::Result<()> {
        Ok(crate::scraper_runs::fail_run(&self.pool, run_id, message, details).await?)
    }

    async fn record_source_result(
        &self,
        run_id: Uuid,
        source: Source,
        listings_found: u32,
        error_message: Option<&str>,
    ) -> anyhow::Result<()> {
        Ok(crate::scraper_runs::record_source_result(
            &self.pool,
            run_id,
            source,
            listings_found,
            error_message,
        )
        .await?)
    }
}

#[derive(Clone)]
pub struct PgConfigStore {
    pool: PgPool,
}

impl PgConfigStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConfigStore for PgConfigStore {
    async fn load(&self) -> anyhow::Result<ScraperConfig> {
        Ok(crate::scraper_config::get_scraper_config(&self.pool).await?)
    }
}
