//! Database operations for `listings` and `price_history`.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use pisoscan_core::{Listing, OperationType, PriceHistoryEntry, PropertyType, Source};

use crate::DbError;

const LISTING_COLUMNS: &str = "id, external_id, source, title, description, price, \
     operation_type, property_type, rooms, bathrooms, area_m2, address, city, province, \
     postal_code, zone, latitude, longitude, image_urls, url, is_active, \
     first_seen_at, last_seen_at";

/// A row from the `listings` table. Enum-ish columns are stored as text and
/// decoded into the domain enums on the way out.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ListingRow {
    pub id: Uuid,
    pub external_id: String,
    pub source: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub operation_type: Option<String>,
    pub property_type: Option<String>,
    pub rooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub area_m2: Option<Decimal>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub postal_code: Option<String>,
    pub zone: Option<String>,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub image_urls: Vec<String>,
    pub url: Option<String>,
    pub is_active: bool,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl ListingRow {
    /// Decodes the row into the domain type.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidEnum`] if a stored enum column holds a
    /// value the domain no longer recognizes.
    pub fn into_listing(self) -> Result<Listing, DbError> {
        let source = Source::from_str(&self.source).map_err(|_| DbError::InvalidEnum {
            field: "source",
            value: self.source.clone(),
        })?;

        let operation_type = self
            .operation_type
            .as_deref()
            .map(|v| {
                OperationType::from_str(v).map_err(|_| DbError::InvalidEnum {
                    field: "operation_type",
                    value: v.to_owned(),
                })
            })
            .transpose()?;

        let property_type = self
            .property_type
            .as_deref()
            .map(|v| {
                PropertyType::from_str(v).map_err(|_| DbError::InvalidEnum {
                    field: "property_type",
                    value: v.to_owned(),
                })
            })
            .transpose()?;

        Ok(Listing {
            id: self.id,
            external_id: self.external_id,
            source,
            title: self.title,
            description: self.description,
            price: self.price,
            operation_type,
            property_type,
            rooms: self.rooms,
            bathrooms: self.bathrooms,
            area_m2: self.area_m2,
            address: self.address,
            city: self.city,
            province: self.province,
            postal_code: self.postal_code,
            zone: self.zone,
            latitude: self.latitude,
            longitude: self.longitude,
            image_urls: self.image_urls,
            url: self.url,
            is_active: self.is_active,
            first_seen_at: self.first_seen_at,
            last_seen_at: self.last_seen_at,
        })
    }
}

/// Looks up one listing by its natural key.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_by_natural_key(
    pool: &PgPool,
    external_id: &str,
    source: Source,
) -> Result<Option<Listing>, DbError> {
    let row = sqlx::query_as::<_, ListingRow>(&format!(
        "SELECT {LISTING_COLUMNS} FROM listings WHERE external_id = $1 AND source = $2"
    ))
    .bind(external_id)
    .bind(source.as_str())
    .fetch_optional(pool)
    .await?;

    row.map(ListingRow::into_listing).transpose()
}

/// Inserts or updates one listing by `(external_id, source)`.
///
/// The caller passes the already-reconciled next state, so the update arm
/// overwrites every descriptive column; `id` and `first_seen_at` stay with
/// the stored row. Returns the stored row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_listing(pool: &PgPool, listing: &Listing) -> Result<Listing, DbError> {
    let row = sqlx::query_as::<_, ListingRow>(&format!(
        "INSERT INTO listings \
             (id, external_id, source, title, description, price, operation_type, \
              property_type, rooms, bathrooms, area_m2, address, city, province, \
              postal_code, zone, latitude, longitude, image_urls, url, is_active, \
              first_seen_at, last_seen_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, \
                 $15, $16, $17, $18, $19, $20, $21, $22, $23) \
         ON CONFLICT (external_id, source) DO UPDATE SET \
             title          = EXCLUDED.title, \
             description    = EXCLUDED.description, \
             price          = EXCLUDED.price, \
             operation_type = EXCLUDED.operation_type, \
             property_type  = EXCLUDED.property_type, \
             rooms          = EXCLUDED.rooms, \
             bathrooms      = EXCLUDED.bathrooms, \
             area_m2        = EXCLUDED.area_m2, \
             address        = EXCLUDED.address, \
             city           = EXCLUDED.city, \
             province       = EXCLUDED.province, \
             postal_code    = EXCLUDED.postal_code, \
             zone           = EXCLUDED.zone, \
             latitude       = EXCLUDED.latitude, \
             longitude      = EXCLUDED.longitude, \
             image_urls     = EXCLUDED.image_urls, \
             url            = EXCLUDED.url, \
             is_active      = EXCLUDED.is_active, \
             last_seen_at   = EXCLUDED.last_seen_at \
         RETURNING {LISTING_COLUMNS}"
    ))
    .bind(listing.id)
    .bind(&listing.external_id)
    .bind(listing.source.as_str())
    .bind(&listing.title)
    .bind(&listing.description)
    .bind(listing.price)
    .bind(listing.operation_type.map(|v| v.to_string()))
    .bind(listing.property_type.map(|v| v.to_string()))
    .bind(listing.rooms)
    .bind(listing.bathrooms)
    .bind(listing.area_m2)
    .bind(&listing.address)
    .bind(&listing.city)
    .bind(&listing.province)
    .bind(&listing.postal_code)
    .bind(&listing.zone)
    .bind(listing.latitude)
    .bind(listing.longitude)
    .bind(&listing.image_urls)
    .bind(&listing.url)
    .bind(listing.is_active)
    .bind(listing.first_seen_at)
    .bind(listing.last_seen_at)
    .fetch_one(pool)
    .await?;

    row.into_listing()
}

/// Appends one price observation for a listing.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn append_price_history(
    pool: &PgPool,
    listing_id: Uuid,
    price: Decimal,
    recorded_at: DateTime<Utc>,
) -> Result<(), DbError> {
    sqlx::query("INSERT INTO price_history (id, listing_id, price, recorded_at) VALUES ($1, $2, $3, $4)")
        .bind(Uuid::new_v4())
        .bind(listing_id)
        .bind(price)
        .bind(recorded_at)
        .execute(pool)
        .await?;

    Ok(())
}

/// Price history for one listing, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_price_history(
    pool: &PgPool,
    listing_id: Uuid,
) -> Result<Vec<PriceHistoryEntry>, DbError> {
    #[derive(sqlx::FromRow)]
    struct HistoryRow {
        id: Uuid,
        listing_id: Uuid,
        price: Decimal,
        recorded_at: DateTime<Utc>,
    }

    let rows = sqlx::query_as::<_, HistoryRow>(
        "SELECT id, listing_id, price, recorded_at \
         FROM price_history \
         WHERE listing_id = $1 \
         ORDER BY recorded_at DESC, id DESC",
    )
    .bind(listing_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| PriceHistoryEntry {
            id: row.id,
            listing_id: row.listing_id,
            price: row.price,
            recorded_at: row.recorded_at,
        })
        .collect())
}

/// Optional filters for the listing search endpoint.
#[derive(Debug, Clone, Default)]
pub struct ListingSearch {
    pub city: Option<String>,
    pub operation_type: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub limit: i64,
    pub offset: i64,
}

/// Active listings matching the filters, most recently seen first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn search_listings(
    pool: &PgPool,
    search: &ListingSearch,
) -> Result<Vec<Listing>, DbError> {
    let rows = sqlx::query_as::<_, ListingRow>(&format!(
        "SELECT {LISTING_COLUMNS} FROM listings \
         WHERE is_active = TRUE \
           AND ($1::text IS NULL OR city ILIKE $1) \
           AND ($2::text IS NULL OR operation_type = $2) \
           AND ($3::numeric IS NULL OR price >= $3) \
           AND ($4::numeric IS NULL OR price <= $4) \
         ORDER BY last_seen_at DESC, id DESC \
         LIMIT $5 OFFSET $6"
    ))
    .bind(&search.city)
    .bind(&search.operation_type)
    .bind(search.min_price)
    .bind(search.max_price)
    .bind(search.limit.clamp(1, 200))
    .bind(search.offset.max(0))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(ListingRow::into_listing).collect()
}
