mod app_config;
mod config;
mod filters;
mod types;

pub use app_config::{AppConfig, ConfigError};
pub use config::ScraperConfig;
pub use filters::passes_filters;
pub use types::{
    Listing, OperationType, PriceHistoryEntry, PropertyType, RawListing, RunCounters, RunStatus,
    ScraperRun, Source,
};
