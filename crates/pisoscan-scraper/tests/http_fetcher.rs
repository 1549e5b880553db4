//! Integration tests for the rate-limited HTTP fetcher.
//!
//! Uses `wiremock` to stand up a local server per test so no real network
//! traffic is made.

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pisoscan_scraper::{HttpFetcher, RateLimiter};

/// Fetcher with an effectively-unlimited rate budget and no backoff delay,
/// so tests run instantly.
fn test_fetcher(max_retries: u32) -> HttpFetcher {
    let limiter = Arc::new(RateLimiter::new(60_000, Duration::ZERO));
    HttpFetcher::new(5, "pisoscan-test/0.1", max_retries, Duration::ZERO, limiter)
        .expect("failed to build test HttpFetcher")
}

#[tokio::test]
async fn returns_body_on_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/venta/pisos-madrid/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = test_fetcher(1);
    let body = fetcher
        .fetch_html(&format!("{}/venta/pisos-madrid/", server.uri()))
        .await;

    assert_eq!(body.as_deref(), Some("<html>ok</html>"));
}

#[tokio::test]
async fn non_success_status_yields_none_after_exhausting_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/venta/pisos-madrid/"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let fetcher = test_fetcher(3);
    let body = fetcher
        .fetch_html(&format!("{}/venta/pisos-madrid/", server.uri()))
        .await;

    assert_eq!(body, None);
}

#[tokio::test]
async fn recovers_when_a_retry_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/alquiler/pisos-madrid/"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/alquiler/pisos-madrid/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = test_fetcher(3);
    let body = fetcher
        .fetch_html(&format!("{}/alquiler/pisos-madrid/", server.uri()))
        .await;

    assert_eq!(body.as_deref(), Some("recovered"));
}

#[tokio::test]
async fn sends_browser_like_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/venta/pisos-madrid/"))
        .and(wiremock::matchers::header(
            "accept-language",
            "es-ES,es;q=0.9,en;q=0.8",
        ))
        .and(wiremock::matchers::header("user-agent", "pisoscan-test/0.1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = test_fetcher(1);
    let body = fetcher
        .fetch_html(&format!("{}/venta/pisos-madrid/", server.uri()))
        .await;

    assert_eq!(body.as_deref(), Some("ok"));
}
