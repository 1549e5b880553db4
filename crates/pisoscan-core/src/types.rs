//! Domain types shared across the scraper, engine, db, and API crates.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An external listing provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Source {
    Idealista,
    Fotocasa,
    Pisoscom,
}

impl Source {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Idealista => "IDEALISTA",
            Source::Fotocasa => "FOTOCASA",
            Source::Pisoscom => "PISOSCOM",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "IDEALISTA" => Ok(Source::Idealista),
            "FOTOCASA" => Ok(Source::Fotocasa),
            "PISOSCOM" => Ok(Source::Pisoscom),
            other => Err(format!("unknown source: {other}")),
        }
    }
}

/// Deal type a listing is offered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationType {
    Venta,
    Alquiler,
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationType::Venta => f.write_str("VENTA"),
            OperationType::Alquiler => f.write_str("ALQUILER"),
        }
    }
}

impl FromStr for OperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "VENTA" => Ok(OperationType::Venta),
            "ALQUILER" => Ok(OperationType::Alquiler),
            other => Err(format!("unknown operation type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PropertyType {
    Apartamento,
    Piso,
    Casa,
    Chalet,
    Duplex,
    Atico,
    Estudio,
    Loft,
    Otro,
}

impl std::fmt::Display for PropertyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PropertyType::Apartamento => "APARTAMENTO",
            PropertyType::Piso => "PISO",
            PropertyType::Casa => "CASA",
            PropertyType::Chalet => "CHALET",
            PropertyType::Duplex => "DUPLEX",
            PropertyType::Atico => "ATICO",
            PropertyType::Estudio => "ESTUDIO",
            PropertyType::Loft => "LOFT",
            PropertyType::Otro => "OTRO",
        };
        f.write_str(name)
    }
}

impl FromStr for PropertyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "APARTAMENTO" => Ok(PropertyType::Apartamento),
            "PISO" => Ok(PropertyType::Piso),
            "CASA" => Ok(PropertyType::Casa),
            "CHALET" => Ok(PropertyType::Chalet),
            "DUPLEX" => Ok(PropertyType::Duplex),
            "ATICO" => Ok(PropertyType::Atico),
            "ESTUDIO" => Ok(PropertyType::Estudio),
            "LOFT" => Ok(PropertyType::Loft),
            "OTRO" => Ok(PropertyType::Otro),
            other => Err(format!("unknown property type: {other}")),
        }
    }
}

/// Transient extraction result for one property ad.
///
/// Natural key is `(external_id, source)`; everything else is whatever the
/// page happened to expose. Immutable once produced by a scrape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawListing {
    pub external_id: String,
    pub source: Source,
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub operation_type: Option<OperationType>,
    pub property_type: Option<PropertyType>,
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
}

impl RawListing {
    /// A listing with only the natural key set. Sources fill in the rest
    /// field by field as extraction succeeds.
    #[must_use]
    pub fn new(external_id: impl Into<String>, source: Source) -> Self {
        Self {
            external_id: external_id.into(),
            source,
            title: None,
            description: None,
            price: None,
            operation_type: None,
            property_type: None,
            rooms: None,
            bathrooms: None,
            area_m2: None,
            address: None,
            city: None,
            province: None,
            postal_code: None,
            zone: None,
            latitude: None,
            longitude: None,
            image_urls: Vec::new(),
            url: None,
        }
    }
}

/// The persisted, deduplicated record for one property ad.
///
/// `(external_id, source)` is unique; `first_seen_at` never changes after
/// insert, `last_seen_at` moves forward on every successful re-scrape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: Uuid,
    pub external_id: String,
    pub source: Source,
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub operation_type: Option<OperationType>,
    pub property_type: Option<PropertyType>,
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

/// One append-only price observation for a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistoryEntry {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub price: Decimal,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => f.write_str("RUNNING"),
            RunStatus::Completed => f.write_str("COMPLETED"),
            RunStatus::Failed => f.write_str("FAILED"),
        }
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(RunStatus::Running),
            "COMPLETED" => Ok(RunStatus::Completed),
            "FAILED" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

/// Aggregate counters for one orchestration cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub total_found: u32,
    pub new: u32,
    pub updated: u32,
    pub price_changes: u32,
    /// Listings contributed per source, in source order.
    pub per_source: BTreeMap<Source, u32>,
}

/// One execution cycle of the orchestrator.
///
/// Created with status RUNNING; COMPLETED and FAILED are terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperRun {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub counters: RunCounters,
    pub error_message: Option<String>,
    pub error_details: Option<String>,
    /// JSON snapshot of the filters in effect when the run started.
    pub filters_snapshot: serde_json::Value,
}
