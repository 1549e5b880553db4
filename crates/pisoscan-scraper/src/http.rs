//! Rate-limited plain HTTP fetcher for sources that render server-side.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use crate::error::ScrapeError;
use crate::rate_limit::RateLimiter;
use crate::retry::fetch_with_retry;

/// HTML-over-HTTP fetcher sharing the process-wide [`RateLimiter`].
///
/// Every attempt acquires the limiter before going out, so retries are
/// rate-limited like first attempts. Fetch failures surface as `None` after
/// the retry budget is spent — the caller skips the page.
pub struct HttpFetcher {
    client: Client,
    limiter: Arc<RateLimiter>,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl HttpFetcher {
    /// Builds the underlying client with timeouts and a browser-like
    /// `User-Agent`.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Http`] if the `reqwest::Client` cannot be
    /// constructed.
    pub fn new(
        timeout_secs: u64,
        user_agent: &str,
        max_retries: u32,
        retry_base_delay: Duration,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self, ScrapeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            limiter,
            max_retries,
            retry_base_delay,
        })
    }

    /// Fetches `url` and returns the response body, or `None` once the
    /// retry budget is exhausted.
    pub async fn fetch_html(&self, url: &str) -> Option<String> {
        fetch_with_retry(self.max_retries, self.retry_base_delay, || async {
            self.limiter.acquire().await;
            match self.try_fetch(url).await {
                Ok(html) => Some(html),
                Err(e) => {
                    tracing::warn!(url, error = %e, "page fetch failed");
                    None
                }
            }
        })
        .await
    }

    async fn try_fetch(&self, url: &str) -> Result<String, ScrapeError> {
        let response = self
            .client
            .get(url)
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header(reqwest::header::ACCEPT_LANGUAGE, "es-ES,es;q=0.9,en;q=0.8")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_owned(),
            });
        }

        Ok(response.text().await?)
    }
}
