//! Source-scraper abstraction and the per-portal implementations.

mod fotocasa;
mod idealista;
mod pisoscom;

pub use fotocasa::FotocasaScraper;
pub use idealista::IdealistaScraper;
pub use pisoscom::PisoscomScraper;

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::Selector;

use pisoscan_core::{OperationType, PropertyType, RawListing, Source};

/// One external listing provider.
///
/// `scrape` builds one search URL per `(city, operation type)` pair from the
/// source's location table, fetches each page, and maps candidate elements
/// to [`RawListing`]s. Unknown cities are skipped with a warning; a single
/// element failing required-field extraction is skipped without aborting
/// its page; a failed page fetch skips that page only.
#[async_trait]
pub trait SourceScraper: Send + Sync {
    fn source(&self) -> Source;

    fn base_url(&self) -> &'static str;

    async fn scrape(
        &self,
        cities: &[String],
        operation_types: &[OperationType],
    ) -> anyhow::Result<Vec<RawListing>>;
}

/// `Selector::parse` on a static pattern; only ever called on compile-time
/// constants, so a parse failure is a programming error.
pub(crate) fn selector(pattern: &str) -> Selector {
    Selector::parse(pattern).expect("static CSS selector must parse")
}

static POSTAL_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{5})\b").expect("valid postal code regex"));

/// First five-digit postal code in free text, if any.
pub(crate) fn postal_code_in(text: &str) -> Option<String> {
    POSTAL_CODE_RE
        .captures(text)
        .map(|caps| caps[1].to_owned())
}

/// Infers the property type from listing-title keywords. Returns `None`
/// when no keyword matches so each source can pick its own default.
pub(crate) fn infer_property_type(title: &str) -> Option<PropertyType> {
    let lower = title.to_lowercase();
    if lower.contains("apartamento") {
        Some(PropertyType::Apartamento)
    } else if lower.contains("piso") {
        Some(PropertyType::Piso)
    } else if lower.contains("chalet") {
        Some(PropertyType::Chalet)
    } else if lower.contains("casa") {
        Some(PropertyType::Casa)
    } else if lower.contains("ático") || lower.contains("atico") {
        Some(PropertyType::Atico)
    } else if lower.contains("dúplex") || lower.contains("duplex") {
        Some(PropertyType::Duplex)
    } else if lower.contains("estudio") {
        Some(PropertyType::Estudio)
    } else if lower.contains("loft") {
        Some(PropertyType::Loft)
    } else {
        None
    }
}

/// Joins a possibly-relative href onto the source's base URL.
pub(crate) fn absolute_url(base_url: &str, href: &str) -> String {
    if href.starts_with("http") {
        href.to_owned()
    } else {
        format!("{base_url}{href}")
    }
}
