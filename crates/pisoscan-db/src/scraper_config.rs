//! Storage for the singleton [`ScraperConfig`] document.

use sqlx::PgPool;

use pisoscan_core::ScraperConfig;

use crate::DbError;

/// Loads the runtime scraper configuration, falling back to the built-in
/// defaults when no row has been written yet.
///
/// # Errors
///
/// Returns [`DbError::ConfigDecode`] if the stored document no longer
/// matches the config shape, or [`DbError::Sqlx`] if the query fails.
pub async fn get_scraper_config(pool: &PgPool) -> Result<ScraperConfig, DbError> {
    let stored: Option<serde_json::Value> =
        sqlx::query_scalar("SELECT config FROM scraper_config WHERE id = 1")
            .fetch_optional(pool)
            .await?;

    match stored {
        Some(value) => serde_json::from_value(value).map_err(DbError::ConfigDecode),
        None => Ok(ScraperConfig::default()),
    }
}

/// Writes the runtime scraper configuration.
///
/// # Errors
///
/// Returns [`DbError::ConfigDecode`] if the config cannot be serialized,
/// or [`DbError::Sqlx`] if the upsert fails.
pub async fn update_scraper_config(pool: &PgPool, config: &ScraperConfig) -> Result<(), DbError> {
    let value = serde_json::to_value(config).map_err(DbError::ConfigDecode)?;

    sqlx::query(
        "INSERT INTO scraper_config (id, config, updated_at) \
         VALUES (1, $1, NOW()) \
         ON CONFLICT (id) DO UPDATE SET config = EXCLUDED.config, updated_at = NOW()",
    )
    .bind(value)
    .execute(pool)
    .await?;

    Ok(())
}
