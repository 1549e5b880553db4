mod listings;
mod scraper;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use pisoscan_engine::Orchestrator;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub orchestrator: Arc<Orchestrator>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn internal(error: &pisoscan_db::DbError) -> Self {
        tracing::error!(error = %error, "database query failed");
        Self::new("internal_error", "database query failed")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.code {
            "not_found" => StatusCode::NOT_FOUND,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

#[derive(Debug, Serialize)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/scraper/status", get(scraper::status))
        .route("/api/scraper/run", post(scraper::trigger_run))
        .route("/api/scraper/run/{source}", post(scraper::trigger_source))
        .route("/api/scraper/runs", get(scraper::list_runs))
        .route(
            "/api/scraper/config",
            get(scraper::get_config).put(scraper::put_config),
        )
        .route("/api/listings", get(listings::search))
        .route(
            "/api/listings/{id}/price-history",
            get(listings::price_history),
        )
        .layer(TraceLayer::new_for_http())
        .layer(build_cors())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<Json<HealthData>, ApiError> {
    pisoscan_db::ping(&state.pool)
        .await
        .map_err(|e| ApiError::internal(&pisoscan_db::DbError::Sqlx(e)))?;

    Ok(Json(HealthData {
        status: "ok",
        database: "reachable",
    }))
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::CONTENT_TYPE])
}
