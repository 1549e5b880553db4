//! Pisos.com scraper.
//!
//! Pisos.com renders its result lists server-side, so a plain rate-limited
//! HTTP fetch is enough — no browser session needed.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use pisoscan_core::{OperationType, PropertyType, RawListing, Source};

use super::{absolute_url, infer_property_type, postal_code_in, selector, SourceScraper};
use crate::http::HttpFetcher;
use crate::parse::{parse_area, parse_int, parse_price};

const BASE_URL: &str = "https://www.pisos.com";

/// Display name -> URL slug for every supported location.
const CITY_SLUGS: &[(&str, &str)] = &[
    ("Madrid", "madrid"),
    ("Barcelona", "barcelona"),
    ("Valencia", "valencia"),
    ("Sevilla", "sevilla"),
    ("Zaragoza", "zaragoza"),
    ("Málaga", "malaga"),
    ("Murcia", "murcia"),
    ("Palma de Mallorca", "palma_de_mallorca"),
    ("Las Palmas de Gran Canaria", "las_palmas_de_gran_canaria"),
    ("Bilbao", "bilbao"),
    ("Alicante", "alicante"),
    ("Córdoba", "cordoba"),
    ("Valladolid", "valladolid"),
    ("Vigo", "vigo"),
    ("Gijón", "gijon"),
    ("L'Hospitalet de Llobregat", "hospitalet_de_llobregat"),
    ("Vitoria-Gasteiz", "vitoria_gasteiz"),
    ("A Coruña", "a_coruna"),
    ("Granada", "granada"),
    ("Elche", "elche"),
    ("Oviedo", "oviedo"),
    ("Santa Cruz de Tenerife", "santa_cruz_de_tenerife"),
    ("Badalona", "badalona"),
    ("Cartagena", "cartagena"),
    ("Terrassa", "terrassa"),
    ("Jerez de la Frontera", "jerez_de_la_frontera"),
    ("Sabadell", "sabadell"),
    ("Móstoles", "mostoles"),
    ("Alcalá de Henares", "alcala_de_henares"),
    ("Pamplona", "pamplona"),
    ("Almería", "almeria"),
    ("San Sebastián", "san_sebastian"),
    ("Santander", "santander"),
    ("Burgos", "burgos"),
    ("Albacete", "albacete"),
    ("Castellón de la Plana", "castellon_de_la_plana"),
    ("Logroño", "logrono"),
    ("Badajoz", "badajoz"),
    ("Salamanca", "salamanca"),
    ("Huelva", "huelva"),
    ("Lleida", "lleida"),
    ("Tarragona", "tarragona"),
    ("León", "leon"),
    ("Cádiz", "cadiz"),
    ("Jaén", "jaen"),
    ("Ourense", "ourense"),
    ("Lugo", "lugo"),
    ("Girona", "girona"),
    ("Cáceres", "caceres"),
    ("Guadalajara", "guadalajara"),
    ("Toledo", "toledo"),
    ("Pontevedra", "pontevedra"),
    ("Palencia", "palencia"),
    ("Ciudad Real", "ciudad_real"),
    ("Zamora", "zamora"),
    ("Ávila", "avila"),
    ("Cuenca", "cuenca"),
    ("Huesca", "huesca"),
    ("Segovia", "segovia"),
    ("Soria", "soria"),
    ("Teruel", "teruel"),
    ("Ceuta", "ceuta"),
    ("Melilla", "melilla"),
];

static CARD_SEL: LazyLock<Selector> = LazyLock::new(|| selector(".ad-preview, .ad-list-item"));
static TITLE_LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| selector("a.ad-preview__title, a.ad-list-item__title"));
static ANY_LINK_SEL: LazyLock<Selector> = LazyLock::new(|| selector("a[href*='/piso-']"));
static PRICE_SEL: LazyLock<Selector> =
    LazyLock::new(|| selector(".ad-preview__price, .ad-list-item__price"));
static FEATURE_SEL: LazyLock<Selector> =
    LazyLock::new(|| selector(".ad-preview__char, .ad-list-item__char"));
static ADDRESS_SEL: LazyLock<Selector> =
    LazyLock::new(|| selector(".ad-preview__address, .ad-list-item__address"));
static ZONE_SEL: LazyLock<Selector> =
    LazyLock::new(|| selector(".ad-preview__zone, .ad-list-item__zone"));
static IMAGE_SEL: LazyLock<Selector> =
    LazyLock::new(|| selector("img.ad-preview__img, img.ad-list-item__img"));
static ANY_IMAGE_SEL: LazyLock<Selector> = LazyLock::new(|| selector("img"));

/// Ad id embedded in detail URLs like `/piso-centro28013-51234567_109900/`.
static ID_IN_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/piso-[^/]+-([a-z0-9_]+)/").expect("valid id regex"));
static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));
/// Postal code baked into the URL slug right before the ad id.
static POSTAL_IN_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{5})-[a-z0-9]+_\d+").expect("valid postal regex"));

pub struct PisoscomScraper {
    fetcher: HttpFetcher,
}

impl PisoscomScraper {
    #[must_use]
    pub fn new(fetcher: HttpFetcher) -> Self {
        Self { fetcher }
    }

    fn search_url(slug: &str, operation: OperationType) -> String {
        match operation {
            OperationType::Venta => format!("{BASE_URL}/venta/pisos-{slug}/"),
            OperationType::Alquiler => format!("{BASE_URL}/alquiler/pisos-{slug}/"),
        }
    }
}

#[async_trait]
impl SourceScraper for PisoscomScraper {
    fn source(&self) -> Source {
        Source::Pisoscom
    }

    fn base_url(&self) -> &'static str {
        BASE_URL
    }

    async fn scrape(
        &self,
        cities: &[String],
        operation_types: &[OperationType],
    ) -> anyhow::Result<Vec<RawListing>> {
        let mut listings = Vec::new();

        for city in cities {
            let Some((display, slug)) = CITY_SLUGS
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(city))
            else {
                tracing::warn!(%city, "unknown city for Pisos.com; skipping");
                continue;
            };

            for operation in operation_types {
                let url = Self::search_url(slug, *operation);
                tracing::info!(%url, "scraping Pisos.com");

                let Some(html) = self.fetcher.fetch_html(&url).await else {
                    tracing::warn!(%url, "page fetch failed; skipping");
                    continue;
                };

                let page_listings = parse_search_page(&html, *operation, display);
                tracing::info!(%url, count = page_listings.len(), "extracted listings");
                listings.extend(page_listings);
            }
        }

        Ok(listings)
    }
}

/// Extracts every listing card on a result page. Cards that fail
/// required-field extraction are skipped; their siblings still parse.
fn parse_search_page(html: &str, operation: OperationType, city: &str) -> Vec<RawListing> {
    let document = Html::parse_document(html);
    let mut listings = Vec::new();

    for card in document.select(&CARD_SEL) {
        match parse_card(card, operation, city) {
            Some(listing) => listings.push(listing),
            None => tracing::debug!("skipping card without detail link or id"),
        }
    }

    listings
}

fn parse_card(card: ElementRef<'_>, operation: OperationType, city: &str) -> Option<RawListing> {
    let link = card
        .select(&TITLE_LINK_SEL)
        .next()
        .or_else(|| card.select(&ANY_LINK_SEL).next())?;
    let href = link.value().attr("href")?;
    let external_id = extract_id_from_url(href)?;

    let mut listing = RawListing::new(external_id, Source::Pisoscom);
    listing.operation_type = Some(operation);
    listing.city = Some(city.to_owned());
    listing.url = Some(absolute_url(BASE_URL, href));

    let title = collect_text(link);
    listing.property_type = infer_property_type(&title).or(Some(PropertyType::Piso));
    listing.title = Some(title);

    listing.price = card
        .select(&PRICE_SEL)
        .next()
        .and_then(|el| parse_price(&collect_text(el)));

    for feature in card.select(&FEATURE_SEL) {
        let text = collect_text(feature).to_lowercase();
        if text.contains("hab") {
            listing.rooms = parse_int(&text);
        } else if text.contains("m²") || text.contains("m2") {
            listing.area_m2 = parse_area(&text);
        } else if text.contains("baño") {
            listing.bathrooms = parse_int(&text);
        }
    }

    listing.address = card.select(&ADDRESS_SEL).next().map(collect_text);
    listing.zone = card.select(&ZONE_SEL).next().map(collect_text);
    listing.postal_code = POSTAL_IN_URL_RE
        .captures(href)
        .map(|caps| caps[1].to_owned())
        .or_else(|| listing.address.as_deref().and_then(postal_code_in));

    let image = card
        .select(&IMAGE_SEL)
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(str::to_owned)
        .or_else(|| {
            card.select(&ANY_IMAGE_SEL)
                .next()
                .and_then(|img| img.value().attr("data-src"))
                .map(str::to_owned)
        });
    if let Some(image) = image {
        listing.image_urls.push(image);
    }

    Some(listing)
}

fn extract_id_from_url(href: &str) -> Option<String> {
    ID_IN_URL_RE
        .captures(href)
        .map(|caps| caps[1].to_owned())
        .or_else(|| DIGITS_RE.find(href).map(|m| m.as_str().to_owned()))
}

fn collect_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_owned()
}
