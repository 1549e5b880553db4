//! Fotocasa scraper.
//!
//! Fotocasa renders its result lists client-side, so pages go through the
//! shared browser session manager.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use pisoscan_core::{OperationType, PropertyType, RawListing, Source};

use super::{absolute_url, infer_property_type, selector, SourceScraper};
use crate::browser::BrowserManager;
use crate::parse::{parse_area, parse_int, parse_price};
use crate::rate_limit::RateLimiter;

const BASE_URL: &str = "https://www.fotocasa.es";

/// Any of these appearing means the result list has rendered.
const WAIT_FOR: &str = "article, [data-testid='re-SearchResult'], a[href*='/vivienda/']";

/// Display name -> URL slug.
const CITY_SLUGS: &[(&str, &str)] = &[
    ("Madrid", "madrid-capital"),
    ("Barcelona", "barcelona-capital"),
    ("Valencia", "valencia-capital"),
    ("Sevilla", "sevilla-capital"),
    ("Zaragoza", "zaragoza-capital"),
    ("Málaga", "malaga-capital"),
    ("Murcia", "murcia-capital"),
    ("Palma de Mallorca", "palma-de-mallorca"),
    ("Las Palmas de Gran Canaria", "las-palmas-de-gran-canaria"),
    ("Bilbao", "bilbao"),
    ("Alicante", "alicante"),
    ("Córdoba", "cordoba-capital"),
    ("Valladolid", "valladolid-capital"),
    ("Vigo", "vigo"),
    ("Gijón", "gijon"),
    ("Vitoria-Gasteiz", "vitoria-gasteiz"),
    ("A Coruña", "a-coruna"),
    ("Granada", "granada-capital"),
    ("Elche", "elche-elx"),
    ("Oviedo", "oviedo"),
    ("Santa Cruz de Tenerife", "santa-cruz-de-tenerife"),
    ("Pamplona", "pamplona-iruna"),
    ("Almería", "almeria-capital"),
    ("San Sebastián", "san-sebastian"),
    ("Santander", "santander"),
    ("Burgos", "burgos-capital"),
    ("Albacete", "albacete-capital"),
    ("Castellón de la Plana", "castellon-de-la-plana"),
    ("Logroño", "logrono"),
    ("Badajoz", "badajoz-capital"),
    ("Salamanca", "salamanca-capital"),
    ("Huelva", "huelva-capital"),
    ("Lleida", "lleida"),
    ("Tarragona", "tarragona-capital"),
    ("León", "leon-capital"),
    ("Cádiz", "cadiz-capital"),
    ("Jaén", "jaen-capital"),
    ("Ourense", "ourense"),
    ("Lugo", "lugo"),
    ("Girona", "girona"),
    ("Cáceres", "caceres"),
    ("Guadalajara", "guadalajara-capital"),
    ("Toledo", "toledo-capital"),
    ("Pontevedra", "pontevedra"),
    ("Palencia", "palencia"),
    ("Ciudad Real", "ciudad-real-capital"),
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

static ARTICLE_SEL: LazyLock<Selector> = LazyLock::new(|| selector("article"));
static DETAIL_LINK_SEL: LazyLock<Selector> = LazyLock::new(|| selector("a[href*='/vivienda/']"));
static TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| selector(".text-subhead, .text-headline-2"));
static FEATURE_SEL: LazyLock<Selector> = LazyLock::new(|| selector("li"));
static ADDRESS_SEL: LazyLock<Selector> = LazyLock::new(|| selector(".text-body-2"));
static IMAGE_SEL: LazyLock<Selector> = LazyLock::new(|| selector("img[src^='http']"));

/// Numeric id at the tail of detail URLs like `/vivienda/.../187654321`.
static ID_IN_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(\d+)(?:/|\.htm|$)").expect("valid id regex"));
/// Price pattern inside the card's flattened text, e.g. `889.000 €`.
static PRICE_IN_TEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\d.]+\s*€").expect("valid price regex"));
static AREA_IN_TEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*m[²2]").expect("valid area regex"));
static ROOMS_IN_TEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*hab").expect("valid rooms regex"));
static BATHS_IN_TEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*baño").expect("valid baths regex"));

pub struct FotocasaScraper {
    rate_limiter: Arc<RateLimiter>,
    browser: Arc<BrowserManager>,
}

impl FotocasaScraper {
    #[must_use]
    pub fn new(rate_limiter: Arc<RateLimiter>, browser: Arc<BrowserManager>) -> Self {
        Self {
            rate_limiter,
            browser,
        }
    }

    fn search_url(slug: &str, operation: OperationType) -> String {
        match operation {
            OperationType::Venta => {
                format!("{BASE_URL}/es/comprar/viviendas/{slug}/todas-las-zonas/l")
            }
            OperationType::Alquiler => {
                format!("{BASE_URL}/es/alquiler/viviendas/{slug}/todas-las-zonas/l")
            }
        }
    }
}

#[async_trait]
impl SourceScraper for FotocasaScraper {
    fn source(&self) -> Source {
        Source::Fotocasa
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
                tracing::warn!(%city, "unknown city for Fotocasa; skipping");
                continue;
            };

            for operation in operation_types {
                let url = Self::search_url(slug, *operation);
                tracing::info!(%url, "scraping Fotocasa");

                self.rate_limiter.acquire().await;
                let Some(html) = self.browser.fetch_page_with_retry(&url, Some(WAIT_FOR)).await
                else {
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

/// Result cards are `article` elements that carry a detail link; anything
/// else (ads, recommendation rails) is ignored.
fn parse_search_page(html: &str, operation: OperationType, city: &str) -> Vec<RawListing> {
    let document = Html::parse_document(html);
    let mut listings = Vec::new();

    for article in document.select(&ARTICLE_SEL) {
        if article.select(&DETAIL_LINK_SEL).next().is_none() {
            continue;
        }
        match parse_card(article, operation, city) {
            Some(listing) => listings.push(listing),
            None => tracing::debug!("skipping card without detail link or id"),
        }
    }

    listings
}

fn parse_card(card: ElementRef<'_>, operation: OperationType, city: &str) -> Option<RawListing> {
    let link = card.select(&DETAIL_LINK_SEL).next()?;
    let href = link.value().attr("href")?;
    let external_id = ID_IN_URL_RE
        .captures(href)
        .map(|caps| caps[1].to_owned())?;

    let mut listing = RawListing::new(external_id, Source::Fotocasa);
    listing.operation_type = Some(operation);
    listing.city = Some(city.to_owned());
    listing.url = Some(absolute_url(BASE_URL, href));

    let card_text = card.text().collect::<String>();

    listing.title = card
        .select(&TITLE_SEL)
        .next()
        .map(collect_text)
        .or_else(|| {
            let text = collect_text(link);
            (text.len() > 10).then_some(text)
        });

    listing.price = PRICE_IN_TEXT_RE
        .find(&card_text)
        .and_then(|m| parse_price(m.as_str()));

    for feature in card.select(&FEATURE_SEL) {
        let text = collect_text(feature).to_lowercase();
        if text.contains("hab") && listing.rooms.is_none() {
            listing.rooms = parse_int(&text);
        } else if (text.contains("m²") || text.contains("m2")) && listing.area_m2.is_none() {
            listing.area_m2 = parse_area(&text);
        } else if text.contains("baño") && listing.bathrooms.is_none() {
            listing.bathrooms = parse_int(&text);
        }
    }

    // The card layout moves around; fall back to scanning the flat text.
    let lower_text = card_text.to_lowercase();
    if listing.area_m2.is_none() {
        listing.area_m2 = AREA_IN_TEXT_RE
            .captures(&card_text)
            .and_then(|caps| parse_area(&caps[1]));
    }
    if listing.rooms.is_none() {
        listing.rooms = ROOMS_IN_TEXT_RE
            .captures(&lower_text)
            .and_then(|caps| caps[1].parse().ok());
    }
    if listing.bathrooms.is_none() {
        listing.bathrooms = BATHS_IN_TEXT_RE
            .captures(&lower_text)
            .and_then(|caps| caps[1].parse().ok());
    }

    listing.address = card.select(&ADDRESS_SEL).next().map(collect_text);
    listing.property_type = listing
        .title
        .as_deref()
        .and_then(infer_property_type)
        .or(Some(PropertyType::Otro));

    if let Some(image) = card
        .select(&IMAGE_SEL)
        .next()
        .and_then(|img| img.value().attr("src"))
    {
        listing.image_urls.push(image.to_owned());
    }

    Some(listing)
}

fn collect_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    const FIXTURE: &str = r#"
        <html><body>
          <article>
            <a href="/es/comprar/vivienda/madrid-capital/aire-acondicionado/187654321/d">
              Piso en venta en Calle de Alcal&aacute;
            </a>
            <span class="text-subhead">Piso en Calle de Alcal&aacute;</span>
            <span>889.000 &euro;</span>
            <ul>
              <li>4 hab.</li>
              <li>2 ba&ntilde;os</li>
              <li>120 m&#178;</li>
            </ul>
            <div class="text-body-2">Salamanca, Madrid</div>
            <img src="https://img.fotocasa.example/p/1.jpg" />
          </article>
          <article>
            <p>Banner sin enlace de vivienda</p>
          </article>
          <article>
            <a href="/es/alquiler/vivienda/madrid-capital/centro/987654/d">
              Estudio luminoso junto a Sol con terraza
            </a>
            <span>950 &euro; 45 m&#178; 1 hab</span>
          </article>
        </body></html>
    "#;

    #[test]
    fn parses_article_cards_with_detail_links() {
        let listings = parse_search_page(FIXTURE, OperationType::Venta, "Madrid");
        assert_eq!(listings.len(), 2);

        let first = &listings[0];
        assert_eq!(first.external_id, "187654321");
        assert_eq!(first.source, Source::Fotocasa);
        assert_eq!(first.price, Some(Decimal::from(889_000)));
        assert_eq!(first.rooms, Some(4));
        assert_eq!(first.bathrooms, Some(2));
        assert_eq!(first.area_m2, Some(Decimal::from(120)));
        assert_eq!(first.address.as_deref(), Some("Salamanca, Madrid"));
        assert_eq!(first.property_type, Some(PropertyType::Piso));
        assert_eq!(first.image_urls, vec!["https://img.fotocasa.example/p/1.jpg"]);
    }

    #[test]
    fn falls_back_to_flat_text_for_features() {
        let listings = parse_search_page(FIXTURE, OperationType::Alquiler, "Madrid");
        let second = &listings[1];
        assert_eq!(second.external_id, "987654");
        assert_eq!(second.price, Some(Decimal::from(950)));
        assert_eq!(second.rooms, Some(1));
        assert_eq!(second.area_m2, Some(Decimal::from(45)));
        assert_eq!(second.property_type, Some(PropertyType::Estudio));
    }

    #[test]
    fn article_without_detail_link_is_ignored() {
        let listings = parse_search_page(
            "<article><p>no link</p></article>",
            OperationType::Venta,
            "Madrid",
        );
        assert!(listings.is_empty());
    }

    #[test]
    fn search_url_switches_on_operation() {
        assert_eq!(
            FotocasaScraper::search_url("madrid-capital", OperationType::Venta),
            "https://www.fotocasa.es/es/comprar/viviendas/madrid-capital/todas-las-zonas/l"
        );
        assert_eq!(
            FotocasaScraper::search_url("madrid-capital", OperationType::Alquiler),
            "https://www.fotocasa.es/es/alquiler/viviendas/madrid-capital/todas-las-zonas/l"
        );
    }
}
