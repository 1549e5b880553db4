//! Read endpoints over the listing catalog.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use pisoscan_core::{Listing, PriceHistoryEntry};
use pisoscan_db::ListingSearch;

use super::{ApiError, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SearchQuery {
    city: Option<String>,
    operation_type: Option<String>,
    min_price: Option<Decimal>,
    max_price: Option<Decimal>,
    limit: Option<i64>,
    offset: Option<i64>,
}

pub(super) async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Listing>>, ApiError> {
    let search = ListingSearch {
        city: query.city,
        operation_type: query.operation_type.map(|s| s.to_uppercase()),
        min_price: query.min_price,
        max_price: query.max_price,
        limit: query.limit.unwrap_or(50),
        offset: query.offset.unwrap_or(0),
    };

    let listings = pisoscan_db::search_listings(&state.pool, &search)
        .await
        .map_err(|e| ApiError::internal(&e))?;

    Ok(Json(listings))
}

pub(super) async fn price_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<PriceHistoryEntry>>, ApiError> {
    let history = pisoscan_db::list_price_history(&state.pool, id)
        .await
        .map_err(|e| ApiError::internal(&e))?;

    Ok(Json(history))
}
