//! Runtime scraper configuration.
//!
//! A singleton-ish record owned by the configuration API; the orchestrator
//! reads it fresh at the start of every run and never mutates it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::types::{OperationType, PropertyType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScraperConfig {
    /// Locations to build search URLs for, by display name.
    pub cities: Vec<String>,
    pub operation_types: Vec<OperationType>,
    /// Post-fetch allow-list; `None` means no property-type filter.
    pub property_types: Option<Vec<PropertyType>>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub min_rooms: Option<i32>,
    pub max_rooms: Option<i32>,
    pub min_area: Option<Decimal>,
    pub max_area: Option<Decimal>,
    /// Master switch consulted at run start.
    pub enabled: bool,
    /// Cron expression, opaque to the engine; the external trigger owns it.
    pub schedule: String,
    /// Active source names; unknown names are skipped with a warning.
    pub sources: Vec<String>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            cities: [
                "Madrid",
                "Barcelona",
                "Valencia",
                "Sevilla",
                "Zaragoza",
                "Málaga",
                "Murcia",
                "Palma de Mallorca",
                "Bilbao",
                "Alicante",
                "Córdoba",
                "Valladolid",
                "Granada",
            ]
            .map(str::to_owned)
            .to_vec(),
            operation_types: vec![OperationType::Venta, OperationType::Alquiler],
            property_types: None,
            min_price: None,
            max_price: None,
            min_rooms: None,
            max_rooms: None,
            min_area: None,
            max_area: None,
            enabled: true,
            schedule: "0 */30 * * * *".to_owned(),
            // Idealista needs its official API to be crawled reliably, so it
            // is not active by default.
            sources: vec!["PISOSCOM".to_owned(), "FOTOCASA".to_owned()],
        }
    }
}

impl ScraperConfig {
    /// JSON snapshot of the filter portion, persisted on every run record.
    #[must_use]
    pub fn filters_snapshot(&self) -> serde_json::Value {
        json!({
            "cities": self.cities,
            "operationTypes": self.operation_types,
            "propertyTypes": self.property_types,
            "minPrice": self.min_price,
            "maxPrice": self.max_price,
            "minRooms": self.min_rooms,
            "maxRooms": self.max_rooms,
            "minArea": self.min_area,
            "maxArea": self.max_area,
            "sources": self.sources,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_enabled_with_both_operations() {
        let config = ScraperConfig::default();
        assert!(config.enabled);
        assert_eq!(
            config.operation_types,
            vec![OperationType::Venta, OperationType::Alquiler]
        );
        assert_eq!(config.sources, vec!["PISOSCOM", "FOTOCASA"]);
        assert!(config.cities.contains(&"Madrid".to_owned()));
    }

    #[test]
    fn filters_snapshot_contains_bounds() {
        let config = ScraperConfig {
            max_price: Some(Decimal::from(250_000)),
            ..ScraperConfig::default()
        };
        let snapshot = config.filters_snapshot();
        assert_eq!(snapshot["maxPrice"], json!("250000"));
        assert!(snapshot["propertyTypes"].is_null());
    }
}
