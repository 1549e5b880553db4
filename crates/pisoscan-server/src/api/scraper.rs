//! Scraper control endpoints: status, manual triggers, run history, and
//! runtime configuration.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use pisoscan_core::{ScraperConfig, ScraperRun};

use super::{ApiError, AppState};

#[derive(Debug, Serialize)]
pub(super) struct ScraperStatus {
    is_running: bool,
    last_run: Option<ScraperRun>,
}

pub(super) async fn status(
    State(state): State<AppState>,
) -> Result<Json<ScraperStatus>, ApiError> {
    let is_running = pisoscan_db::running_run_exists(&state.pool)
        .await
        .map_err(|e| ApiError::internal(&e))?;
    let last_run = pisoscan_db::list_runs(&state.pool, 1)
        .await
        .map_err(|e| ApiError::internal(&e))?
        .into_iter()
        .next();

    Ok(Json(ScraperStatus {
        is_running,
        last_run,
    }))
}

#[derive(Debug, Serialize)]
pub(super) struct Triggered {
    status: &'static str,
}

/// Fire-and-forget full run. The run's single-flight guard decides whether
/// anything actually starts; callers watch `/api/scraper/status`.
pub(super) async fn trigger_run(State(state): State<AppState>) -> (StatusCode, Json<Triggered>) {
    let orchestrator = Arc::clone(&state.orchestrator);
    tokio::spawn(async move {
        let outcome = orchestrator.run().await;
        tracing::info!(?outcome, "manually triggered run finished");
    });

    (StatusCode::ACCEPTED, Json(Triggered { status: "triggered" }))
}

/// Fire-and-forget single-source run (the manual path; no run record).
pub(super) async fn trigger_source(
    State(state): State<AppState>,
    Path(source): Path<String>,
) -> (StatusCode, Json<Triggered>) {
    let orchestrator = Arc::clone(&state.orchestrator);
    tokio::spawn(async move {
        match orchestrator.run_single_source(&source).await {
            Ok(persisted) => {
                tracing::info!(%source, persisted, "single-source run finished");
            }
            Err(e) => tracing::error!(%source, error = %e, "single-source run failed"),
        }
    });

    (StatusCode::ACCEPTED, Json(Triggered { status: "triggered" }))
}

#[derive(Debug, Deserialize)]
pub(super) struct RunsQuery {
    limit: Option<i64>,
}

pub(super) async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<RunsQuery>,
) -> Result<Json<Vec<ScraperRun>>, ApiError> {
    let runs = pisoscan_db::list_runs(&state.pool, query.limit.unwrap_or(50))
        .await
        .map_err(|e| ApiError::internal(&e))?;

    Ok(Json(runs))
}

pub(super) async fn get_config(
    State(state): State<AppState>,
) -> Result<Json<ScraperConfig>, ApiError> {
    let config = pisoscan_db::get_scraper_config(&state.pool)
        .await
        .map_err(|e| ApiError::internal(&e))?;

    Ok(Json(config))
}

pub(super) async fn put_config(
    State(state): State<AppState>,
    Json(config): Json<ScraperConfig>,
) -> Result<Json<ScraperConfig>, ApiError> {
    if config.cities.is_empty() {
        return Err(ApiError::new(
            "validation_error",
            "cities must not be empty",
        ));
    }
    if config.operation_types.is_empty() {
        return Err(ApiError::new(
            "validation_error",
            "operationTypes must not be empty",
        ));
    }

    pisoscan_db::update_scraper_config(&state.pool, &config)
        .await
        .map_err(|e| ApiError::internal(&e))?;

    Ok(Json(config))
}
