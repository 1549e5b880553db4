//! Idealista scraper.
//!
//! Idealista fronts its site with commercial anti-bot protection, so this
//! source is not in the default source list. The implementation is kept for
//! configurations that route traffic through an allowed channel; it shares
//! the browser session manager with Fotocasa.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use pisoscan_core::{OperationType, PropertyType, RawListing, Source};

use super::{absolute_url, infer_property_type, postal_code_in, selector, SourceScraper};
use crate::browser::BrowserManager;
use crate::parse::{parse_area, parse_int, parse_price};
use crate::rate_limit::RateLimiter;

const BASE_URL: &str = "https://www.idealista.com";

const WAIT_FOR: &str = "article.item, .item-info-container, .listing-items";

/// Display name -> (URL slug, province). The slug embeds the province,
/// which is how Idealista disambiguates same-named municipalities.
const LOCATIONS: &[(&str, &str, &str)] = &[
    ("Madrid", "madrid-madrid", "Madrid"),
    ("Barcelona", "barcelona-barcelona", "Barcelona"),
    ("Valencia", "valencia-valencia", "Valencia"),
    ("Sevilla", "sevilla-sevilla", "Sevilla"),
    ("Zaragoza", "zaragoza-zaragoza", "Zaragoza"),
    ("Málaga", "malaga-malaga", "Málaga"),
    ("Murcia", "murcia-murcia", "Murcia"),
    ("Palma de Mallorca", "palma-de-mallorca-balears-illes", "Illes Balears"),
    (
        "Las Palmas de Gran Canaria",
        "las-palmas-de-gran-canaria-las-palmas",
        "Las Palmas",
    ),
    ("Bilbao", "bilbao-vizcaya", "Vizcaya"),
    ("Alicante", "alicante-alacant-alicante", "Alicante"),
    ("Córdoba", "cordoba-cordoba", "Córdoba"),
    ("Valladolid", "valladolid-valladolid", "Valladolid"),
    ("Vigo", "vigo-pontevedra", "Pontevedra"),
    ("Gijón", "gijon-asturias", "Asturias"),
    ("Vitoria-Gasteiz", "vitoria-gasteiz-alava", "Álava"),
    ("A Coruña", "a-coruna-a-coruna", "A Coruña"),
    ("Granada", "granada-granada", "Granada"),
    ("Elche", "elche-elx-alicante", "Alicante"),
    ("Oviedo", "oviedo-asturias", "Asturias"),
    (
        "Santa Cruz de Tenerife",
        "santa-cruz-de-tenerife-santa-cruz-de-tenerife",
        "Santa Cruz de Tenerife",
    ),
    ("Pamplona", "pamplona-iruna-navarra", "Navarra"),
    ("Almería", "almeria-almeria", "Almería"),
    ("San Sebastián", "donostia-san-sebastian-guipuzcoa", "Guipúzcoa"),
    ("Santander", "santander-cantabria", "Cantabria"),
    ("Burgos", "burgos-burgos", "Burgos"),
    ("Albacete", "albacete-albacete", "Albacete"),
    (
        "Castellón de la Plana",
        "castellon-de-la-plana-castello-de-la-plana-castellon",
        "Castellón",
    ),
    ("Logroño", "logrono-la-rioja", "La Rioja"),
    ("Badajoz", "badajoz-badajoz", "Badajoz"),
    ("Salamanca", "salamanca-salamanca", "Salamanca"),
    ("Huelva", "huelva-huelva", "Huelva"),
    ("Lleida", "lleida-lleida", "Lleida"),
    ("Tarragona", "tarragona-tarragona", "Tarragona"),
    ("León", "leon-leon", "León"),
    ("Cádiz", "cadiz-cadiz", "Cádiz"),
    ("Jaén", "jaen-jaen", "Jaén"),
    ("Ourense", "ourense-ourense", "Ourense"),
    ("Lugo", "lugo-lugo", "Lugo"),
    ("Girona", "girona-girona", "Girona"),
    ("Cáceres", "caceres-caceres", "Cáceres"),
    ("Guadalajara", "guadalajara-guadalajara", "Guadalajara"),
    ("Toledo", "toledo-toledo", "Toledo"),
    ("Pontevedra", "pontevedra-pontevedra", "Pontevedra"),
    ("Palencia", "palencia-palencia", "Palencia"),
    ("Ciudad Real", "ciudad-real-ciudad-real", "Ciudad Real"),
    ("Zamora", "zamora-zamora", "Zamora"),
    ("Ávila", "avila-avila", "Ávila"),
    ("Cuenca", "cuenca-cuenca", "Cuenca"),
    ("Huesca", "huesca-huesca", "Huesca"),
    ("Segovia", "segovia-segovia", "Segovia"),
    ("Soria", "soria-soria", "Soria"),
    ("Teruel", "teruel-teruel", "Teruel"),
    ("Ceuta", "ceuta-ceuta", "Ceuta"),
    ("Melilla", "melilla-melilla", "Melilla"),
    // Madrid metro area
    ("Alcalá de Henares", "alcala-de-henares-madrid", "Madrid"),
    ("Móstoles", "mostoles-madrid", "Madrid"),
    ("Getafe", "getafe-madrid", "Madrid"),
    ("Alcorcón", "alcorcon-madrid", "Madrid"),
    ("Leganés", "leganes-madrid", "Madrid"),
    ("Fuenlabrada", "fuenlabrada-madrid", "Madrid"),
    ("Alcobendas", "alcobendas-madrid", "Madrid"),
    ("Pozuelo de Alarcón", "pozuelo-de-alarcon-madrid", "Madrid"),
    ("Las Rozas de Madrid", "las-rozas-de-madrid-madrid", "Madrid"),
    // Costa del Sol and Levante municipalities
    ("Marbella", "marbella-malaga", "Málaga"),
    ("Fuengirola", "fuengirola-malaga", "Málaga"),
    ("Torremolinos", "torremolinos-malaga", "Málaga"),
    ("Benalmádena", "benalmadena-malaga", "Málaga"),
    ("Estepona", "estepona-malaga", "Málaga"),
    ("Torrevieja", "torrevieja-alicante", "Alicante"),
    ("Benidorm", "benidorm-alicante", "Alicante"),
    ("Dénia", "denia-alicante", "Alicante"),
    ("Gandía", "gandia-valencia", "Valencia"),
    ("Cartagena", "cartagena-murcia", "Murcia"),
    ("Jerez de la Frontera", "jerez-de-la-frontera-cadiz", "Cádiz"),
    ("Dos Hermanas", "dos-hermanas-sevilla", "Sevilla"),
    ("Badalona", "badalona-barcelona", "Barcelona"),
    ("Terrassa", "terrassa-barcelona", "Barcelona"),
    ("Sabadell", "sabadell-barcelona", "Barcelona"),
    ("Sitges", "sitges-barcelona", "Barcelona"),
    ("Santiago de Compostela", "santiago-de-compostela-a-coruna", "A Coruña"),
];

static ITEM_SEL: LazyLock<Selector> = LazyLock::new(|| selector("article.item"));
static ITEM_FALLBACK_SEL: LazyLock<Selector> =
    LazyLock::new(|| selector(".item-info-container"));
static ITEM_LAST_RESORT_SEL: LazyLock<Selector> =
    LazyLock::new(|| selector("[data-element-id]"));
static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| selector("a.item-link"));
static PRICE_SEL: LazyLock<Selector> = LazyLock::new(|| selector(".item-price"));
static DETAIL_SEL: LazyLock<Selector> = LazyLock::new(|| selector(".item-detail"));
static IMAGE_SEL: LazyLock<Selector> = LazyLock::new(|| selector("img.item-gallery"));

static ID_IN_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/inmueble/(\d+)/").expect("valid id regex"));

pub struct IdealistaScraper {
    rate_limiter: Arc<RateLimiter>,
    browser: Arc<BrowserManager>,
}

impl IdealistaScraper {
    #[must_use]
    pub fn new(rate_limiter: Arc<RateLimiter>, browser: Arc<BrowserManager>) -> Self {
        Self {
            rate_limiter,
            browser,
        }
    }

    fn search_url(slug: &str, operation: OperationType) -> String {
        match operation {
            OperationType::Venta => format!("{BASE_URL}/venta-viviendas/{slug}/"),
            OperationType::Alquiler => format!("{BASE_URL}/alquiler-viviendas/{slug}/"),
        }
    }
}

#[async_trait]
impl SourceScraper for IdealistaScraper {
    fn source(&self) -> Source {
        Source::Idealista
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
            let Some((display, slug, province)) = LOCATIONS
                .iter()
                .find(|(name, _, _)| name.eq_ignore_ascii_case(city))
            else {
                tracing::warn!(%city, "unknown location for Idealista; skipping");
                continue;
            };

            for operation in operation_types {
                let url = Self::search_url(slug, *operation);
                tracing::info!(%url, "scraping Idealista");

                self.rate_limiter.acquire_with_cooldown().await;
                let Some(html) = self.browser.fetch_page_with_retry(&url, Some(WAIT_FOR)).await
                else {
                    tracing::warn!(%url, "page fetch failed; skipping");
                    continue;
                };

                let page_listings = parse_search_page(&html, *operation, display, province);
                tracing::info!(%url, count = page_listings.len(), "extracted listings");
                listings.extend(page_listings);
            }
        }

        Ok(listings)
    }
}

fn parse_search_page(
    html: &str,
    operation: OperationType,
    city: &str,
    province: &str,
) -> Vec<RawListing> {
    let document = Html::parse_document(html);

    // The markup shifts between redesigns; try selectors from most to
    // least specific.
    let mut cards: Vec<ElementRef<'_>> = document.select(&ITEM_SEL).collect();
    if cards.is_empty() {
        cards = document.select(&ITEM_FALLBACK_SEL).collect();
    }
    if cards.is_empty() {
        cards = document.select(&ITEM_LAST_RESORT_SEL).collect();
    }

    let mut listings = Vec::new();
    for card in cards {
        match parse_card(card, operation, city, province) {
            Some(listing) => listings.push(listing),
            None => tracing::debug!("skipping card without detail link or id"),
        }
    }
    listings
}

fn parse_card(
    card: ElementRef<'_>,
    operation: OperationType,
    city: &str,
    province: &str,
) -> Option<RawListing> {
    let link = card.select(&LINK_SEL).next()?;
    let href = link.value().attr("href")?;
    let external_id = ID_IN_URL_RE
        .captures(href)
        .map(|caps| caps[1].to_owned())?;

    let mut listing = RawListing::new(external_id, Source::Idealista);
    listing.operation_type = Some(operation);
    listing.city = Some(city.to_owned());
    listing.province = Some(province.to_owned());
    listing.url = Some(absolute_url(BASE_URL, href));

    let title = collect_text(link);
    listing.property_type = infer_property_type(&title).or(Some(PropertyType::Piso));
    listing.postal_code = postal_code_in(&title);
    listing.title = Some(title);

    listing.price = card
        .select(&PRICE_SEL)
        .next()
        .and_then(|el| parse_price(&collect_text(el)));

    for detail in card.select(&DETAIL_SEL) {
        let text = collect_text(detail).to_lowercase();
        if text.contains("hab") {
            listing.rooms = parse_int(&text);
        } else if text.contains("m²") || text.contains("m2") {
            listing.area_m2 = parse_area(&text);
        } else if text.contains("baño") {
            listing.bathrooms = parse_int(&text);
        }
    }

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
          <article class="item">
            <a class="item-link" href="/inmueble/106789012/">
              Piso en venta en calle de Goya, 28001
            </a>
            <span class="item-price">675.000&euro;</span>
            <span class="item-detail">3 hab.</span>
            <span class="item-detail">110 m&#178;</span>
            <img class="item-gallery" src="https://img.idealista.example/1.jpg" />
          </article>
          <article class="item">
            <span class="item-price">Sin enlace</span>
          </article>
        </body></html>
    "#;

    #[test]
    fn parses_items_and_carries_province() {
        let listings = parse_search_page(FIXTURE, OperationType::Venta, "Madrid", "Madrid");
        assert_eq!(listings.len(), 1);

        let item = &listings[0];
        assert_eq!(item.external_id, "106789012");
        assert_eq!(item.source, Source::Idealista);
        assert_eq!(item.price, Some(Decimal::from(675_000)));
        assert_eq!(item.rooms, Some(3));
        assert_eq!(item.area_m2, Some(Decimal::from(110)));
        assert_eq!(item.city.as_deref(), Some("Madrid"));
        assert_eq!(item.province.as_deref(), Some("Madrid"));
        assert_eq!(item.postal_code.as_deref(), Some("28001"));
        assert_eq!(
            item.url.as_deref(),
            Some("https://www.idealista.com/inmueble/106789012/")
        );
    }

    #[test]
    fn falls_back_to_info_container_selector() {
        let html = r#"
            <div class="item-info-container">
              <a class="item-link" href="/inmueble/555000111/">Casa rural</a>
              <span class="item-price">120.000&euro;</span>
            </div>
        "#;
        let listings = parse_search_page(html, OperationType::Venta, "Cuenca", "Cuenca");
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].external_id, "555000111");
        assert_eq!(listings[0].property_type, Some(PropertyType::Casa));
    }

    #[test]
    fn search_url_embeds_operation_and_slug() {
        assert_eq!(
            IdealistaScraper::search_url("madrid-madrid", OperationType::Venta),
            "https://www.idealista.com/venta-viviendas/madrid-madrid/"
        );
    }
}
