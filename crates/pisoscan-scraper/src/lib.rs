pub mod browser;
pub mod error;
pub mod http;
pub mod parse;
pub mod rate_limit;
pub mod retry;
pub mod sources;

use std::sync::Arc;
use std::time::Duration;

pub use browser::{BrowserConfig, BrowserManager};
pub use error::ScrapeError;
pub use http::HttpFetcher;
pub use rate_limit::RateLimiter;
pub use sources::SourceScraper;

use pisoscan_core::AppConfig;
use sources::{FotocasaScraper, IdealistaScraper, PisoscomScraper};

/// The process-wide scraping resources: one rate limiter, one browser
/// manager, and one `SourceScraper` per supported source, all sharing them.
pub struct ScraperStack {
    pub rate_limiter: Arc<RateLimiter>,
    pub browser: Arc<BrowserManager>,
    pub sources: Vec<Arc<dyn SourceScraper>>,
}

impl ScraperStack {
    /// Assemble the shared resources and every source implementation from
    /// process configuration. Which sources actually run is decided per run
    /// from the persisted `ScraperConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Http`] if the HTTP client cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, ScrapeError> {
        let rate_limiter = Arc::new(RateLimiter::new(
            config.requests_per_minute,
            Duration::from_millis(config.cooldown_ms),
        ));
        let browser = Arc::new(BrowserManager::new(BrowserConfig {
            navigation_timeout: Duration::from_secs(config.navigation_timeout_secs),
            max_retries: config.max_fetch_retries,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
            user_agent: config.user_agent.clone(),
            ..BrowserConfig::default()
        }));
        let fetcher = HttpFetcher::new(
            config.request_timeout_secs,
            &config.user_agent,
            config.max_fetch_retries,
            Duration::from_millis(config.retry_base_delay_ms),
            Arc::clone(&rate_limiter),
        )?;

        let sources: Vec<Arc<dyn SourceScraper>> = vec![
            Arc::new(PisoscomScraper::new(fetcher)),
            Arc::new(FotocasaScraper::new(
                Arc::clone(&rate_limiter),
                Arc::clone(&browser),
            )),
            Arc::new(IdealistaScraper::new(
                Arc::clone(&rate_limiter),
                Arc::clone(&browser),
            )),
        ];

        Ok(Self {
            rate_limiter,
            browser,
            sources,
        })
    }
}
