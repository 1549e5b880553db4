//! Database operations for `scraper_runs` and `scraper_run_sources`.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use pisoscan_core::{RunCounters, RunStatus, ScraperRun, Source};

use crate::DbError;

const RUN_COLUMNS: &str = "id, started_at, finished_at, status, total_found, new_listings, \
     updated_listings, price_changes, error_message, error_details, filters_snapshot";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScraperRunRow {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: String,
    pub total_found: i32,
    pub new_listings: i32,
    pub updated_listings: i32,
    pub price_changes: i32,
    pub error_message: Option<String>,
    pub error_details: Option<String>,
    pub filters_snapshot: serde_json::Value,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RunSourceRow {
    pub run_id: Uuid,
    pub source: String,
    pub listings_found: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ScraperRunRow {
    fn into_run(self, per_source: BTreeMap<Source, u32>) -> Result<ScraperRun, DbError> {
        let status = RunStatus::from_str(&self.status).map_err(|_| DbError::InvalidEnum {
            field: "status",
            value: self.status.clone(),
        })?;

        Ok(ScraperRun {
            id: self.id,
            started_at: self.started_at,
            finished_at: self.finished_at,
            status,
            counters: RunCounters {
                total_found: u32::try_from(self.total_found).unwrap_or(0),
                new: u32::try_from(self.new_listings).unwrap_or(0),
                updated: u32::try_from(self.updated_listings).unwrap_or(0),
                price_changes: u32::try_from(self.price_changes).unwrap_or(0),
                per_source,
            },
            error_message: self.error_message,
            error_details: self.error_details,
            filters_snapshot: self.filters_snapshot,
        })
    }
}

/// Creates a RUNNING run — atomically, unless one already exists.
///
/// The insert is guarded twice: a `WHERE NOT EXISTS` clause for the common
/// case and the partial unique index `uniq_scraper_runs_one_running` for
/// the race where two triggers fire together. Either guard tripping means
/// "someone else is running" and yields `Ok(None)`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails for any other reason.
pub async fn try_create_run(
    pool: &PgPool,
    filters_snapshot: &serde_json::Value,
) -> Result<Option<ScraperRun>, DbError> {
    let result = sqlx::query_as::<_, ScraperRunRow>(&format!(
        "INSERT INTO scraper_runs (id, status, filters_snapshot) \
         SELECT $1, 'RUNNING', $2 \
         WHERE NOT EXISTS (SELECT 1 FROM scraper_runs WHERE status = 'RUNNING') \
         RETURNING {RUN_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(filters_snapshot)
    .fetch_optional(pool)
    .await;

    match result {
        Ok(Some(row)) => Ok(Some(row.into_run(BTreeMap::new())?)),
        Ok(None) => Ok(None),
        Err(sqlx::Error::Database(db_err))
            if db_err.constraint() == Some("uniq_scraper_runs_one_running") =>
        {
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn running_run_exists(pool: &PgPool) -> Result<bool, DbError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM scraper_runs WHERE status = 'RUNNING')",
    )
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

/// Marks a run COMPLETED and writes its aggregate counters.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] if the run is not RUNNING, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn complete_run(
    pool: &PgPool,
    run_id: Uuid,
    counters: &RunCounters,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE scraper_runs \
         SET status = 'COMPLETED', finished_at = NOW(), total_found = $1, \
             new_listings = $2, updated_listings = $3, price_changes = $4 \
         WHERE id = $5 AND status = 'RUNNING'",
    )
    .bind(to_i32(counters.total_found))
    .bind(to_i32(counters.new))
    .bind(to_i32(counters.updated))
    .bind(to_i32(counters.price_changes))
    .bind(run_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRunTransition {
            id: run_id,
            expected_status: "RUNNING",
        });
    }

    Ok(())
}

/// Marks a run FAILED with a message and optional details.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] if the run is not RUNNING, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn fail_run(
    pool: &PgPool,
    run_id: Uuid,
    error_message: &str,
    error_details: Option<&str>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE scraper_runs \
         SET status = 'FAILED', finished_at = NOW(), error_message = $1, error_details = $2 \
         WHERE id = $3 AND status = 'RUNNING'",
    )
    .bind(error_message)
    .bind(error_details)
    .bind(run_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRunTransition {
            id: run_id,
            expected_status: "RUNNING",
        });
    }

    Ok(())
}

/// Upserts one source's contribution to a run.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn record_source_result(
    pool: &PgPool,
    run_id: Uuid,
    source: Source,
    listings_found: u32,
    error_message: Option<&str>,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO scraper_run_sources (run_id, source, listings_found, error_message) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (run_id, source) DO UPDATE SET \
             listings_found = EXCLUDED.listings_found, \
             error_message  = EXCLUDED.error_message",
    )
    .bind(run_id)
    .bind(source.as_str())
    .bind(to_i32(listings_found))
    .bind(error_message)
    .execute(pool)
    .await?;

    Ok(())
}

/// The most recent `limit` runs, newest first, with per-source counts
/// merged in.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if a query fails.
pub async fn list_runs(pool: &PgPool, limit: i64) -> Result<Vec<ScraperRun>, DbError> {
    let rows = sqlx::query_as::<_, ScraperRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM scraper_runs \
         ORDER BY started_at DESC, id DESC \
         LIMIT $1"
    ))
    .bind(limit.clamp(1, 200))
    .fetch_all(pool)
    .await?;

    let run_ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let source_rows = sqlx::query_as::<_, RunSourceRow>(
        "SELECT run_id, source, listings_found, error_message, created_at \
         FROM scraper_run_sources \
         WHERE run_id = ANY($1)",
    )
    .bind(&run_ids)
    .fetch_all(pool)
    .await?;

    let mut per_run: BTreeMap<Uuid, BTreeMap<Source, u32>> = BTreeMap::new();
    for source_row in source_rows {
        if let Ok(source) = Source::from_str(&source_row.source) {
            per_run
                .entry(source_row.run_id)
                .or_default()
                .insert(source, u32::try_from(source_row.listings_found).unwrap_or(0));
        }
    }

    rows.into_iter()
        .map(|row| {
            let per_source = per_run.remove(&row.id).unwrap_or_default();
            row.into_run(per_source)
        })
        .collect()
}

/// Fails RUNNING runs older than `max_age_hours`.
///
/// A crashed process leaves its run RUNNING forever, which would wedge the
/// single-flight guard; this sweep is called at startup to clear such
/// orphans. Returns the number of runs swept.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn fail_stale_runs(pool: &PgPool, max_age_hours: u64) -> Result<u64, DbError> {
    let rows_affected = sqlx::query(
        "UPDATE scraper_runs \
         SET status = 'FAILED', finished_at = NOW(), \
             error_message = 'orphaned RUNNING run swept at startup' \
         WHERE status = 'RUNNING' \
           AND started_at < NOW() - make_interval(hours => $1)",
    )
    .bind(i32::try_from(max_age_hours).unwrap_or(i32::MAX))
    .execute(pool)
    .await?
    .rows_affected();

    Ok(rows_affected)
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
