//! Shared headless-browser session manager.
//!
//! Owns at most one Chrome process for the lifetime of this process. The
//! process is launched lazily on first use behind a lock, reused by every
//! subsequent fetch, and torn down exactly once by [`BrowserManager::shutdown`].
//! Each fetch runs in a fresh incognito context so cookies and storage never
//! leak between fetches.
//!
//! Failure semantics: transient navigation and timeout errors are swallowed
//! at this boundary and surfaced as `None` — callers treat `None` as "no
//! data this attempt" and decide whether to retry.

use std::ffi::OsStr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptions};

use crate::retry::fetch_with_retry;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

/// Chrome flags that keep the browser quiet and reduce the obvious
/// automation tells.
const CHROME_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-dev-shm-usage",
    "--disable-accelerated-2d-canvas",
    "--disable-gpu",
    "--disable-infobars",
    "--disable-extensions",
    "--disable-plugins-discovery",
    "--lang=es-ES",
];

/// Injected before any page script runs: hides the webdriver flag and
/// fills in the properties headless Chrome leaves empty.
const STEALTH_INIT_SCRIPT: &str = r"
    Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
    Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
    Object.defineProperty(navigator, 'languages', { get: () => ['es-ES', 'es', 'en'] });
    Object.defineProperty(navigator, 'platform', { get: () => 'Win32' });
    delete window.cdc_adoQpoasnfa76pfcZLmcfl_Array;
    delete window.cdc_adoQpoasnfa76pfcZLmcfl_Promise;
    delete window.cdc_adoQpoasnfa76pfcZLmcfl_Symbol;
";

/// Cookie/consent overlays seen across the supported portals, most specific
/// first. The first selector that matches a clickable element wins; none
/// matching is not an error.
const CONSENT_SELECTORS: &[&str] = &[
    "#didomi-notice-agree-button",
    "button[id*='accept']",
    "button[class*='accept']",
    "[data-testid='accept-cookies']",
    ".didomi-continue-without-agreeing",
    "#onetrust-accept-btn-handler",
];

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Upper bound for navigation and element waits.
    pub navigation_timeout: Duration,
    /// Extra wait after navigation for client-side rendering.
    pub settle_wait: Duration,
    /// Per-selector budget when waiting for an optional `wait_condition`.
    pub selector_timeout: Duration,
    /// Pause between scroll stages while triggering lazy-loaded content.
    pub scroll_pause: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub user_agent: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(60),
            settle_wait: Duration::from_secs(5),
            selector_timeout: Duration::from_secs(10),
            scroll_pause: Duration::from_millis(500),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(2),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

pub struct BrowserManager {
    config: BrowserConfig,
    browser: Mutex<Option<Browser>>,
}

impl BrowserManager {
    #[must_use]
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            browser: Mutex::new(None),
        }
    }

    /// Fetches `url` in a fresh incognito context and returns the rendered
    /// HTML, or `None` on any failure.
    ///
    /// `wait_condition` is an optional comma-separated list of CSS
    /// selectors; the first one to appear wins. None appearing within the
    /// per-selector budget is logged but not fatal.
    pub async fn fetch_page(&self, url: &str, wait_condition: Option<&str>) -> Option<String> {
        let browser = match self.ensure_browser() {
            Ok(browser) => browser,
            Err(e) => {
                tracing::error!(error = %e, "failed to launch headless browser");
                return None;
            }
        };

        let config = self.config.clone();
        let url_owned = url.to_owned();
        let wait = wait_condition.map(str::to_owned);

        let outcome = tokio::task::spawn_blocking(move || {
            fetch_page_blocking(&browser, &config, &url_owned, wait.as_deref())
        })
        .await;

        match outcome {
            Ok(html) => html,
            Err(e) => {
                tracing::error!(url, error = %e, "browser fetch task panicked");
                None
            }
        }
    }

    /// [`BrowserManager::fetch_page`] with retries: up to `max_retries`
    /// attempts, backing off `attempt * retry_base_delay` between them.
    pub async fn fetch_page_with_retry(
        &self,
        url: &str,
        wait_condition: Option<&str>,
    ) -> Option<String> {
        fetch_with_retry(
            self.config.max_retries,
            self.config.retry_base_delay,
            || self.fetch_page(url, wait_condition),
        )
        .await
    }

    /// Closes the browser process. Idempotent; safe to call concurrently
    /// with in-flight fetches (the process exits once they drop their
    /// handles).
    pub fn shutdown(&self) {
        let mut guard = self
            .browser
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if guard.take().is_some() {
            tracing::info!("shutting down headless browser");
        }
    }

    /// Returns the shared browser handle, launching Chrome on first use.
    fn ensure_browser(&self) -> Result<Browser, anyhow::Error> {
        let mut guard = self
            .browser
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(browser) = guard.as_ref() {
            return Ok(browser.clone());
        }

        tracing::info!("launching headless browser");
        let args: Vec<&OsStr> = CHROME_ARGS.iter().map(OsStr::new).collect();
        let options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .window_size(Some((1920, 1080)))
            .args(args)
            // The manager owns the process lifetime; do not let the crate's
            // idle watchdog reap it between runs.
            .idle_browser_timeout(Duration::from_secs(86_400))
            .build()
            .map_err(anyhow::Error::msg)?;
        let browser = Browser::new(options)?;
        tracing::info!("headless browser launched");

        *guard = Some(browser.clone());
        Ok(browser)
    }
}

impl Drop for BrowserManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// One complete fetch: context, stealth setup, navigation, consent
/// dismissal, waits, lazy-load scroll, content capture.
fn fetch_page_blocking(
    browser: &Browser,
    config: &BrowserConfig,
    url: &str,
    wait_condition: Option<&str>,
) -> Option<String> {
    match try_fetch(browser, config, url, wait_condition) {
        Ok(html) => {
            tracing::debug!(url, bytes = html.len(), "fetched page");
            Some(html)
        }
        Err(e) => {
            tracing::error!(url, error = %e, "browser fetch failed");
            None
        }
    }
}

fn try_fetch(
    browser: &Browser,
    config: &BrowserConfig,
    url: &str,
    wait_condition: Option<&str>,
) -> Result<String, anyhow::Error> {
    // Incognito context: isolated cookies and storage per fetch.
    let context = browser.new_context()?;
    let tab = context.new_tab()?;
    tab.set_default_timeout(config.navigation_timeout);

    tab.set_user_agent(&config.user_agent, Some("es-ES,es;q=0.9,en;q=0.8"), Some("Win32"))?;
    tab.call_method(Page::AddScriptToEvaluateOnNewDocument {
        source: STEALTH_INIT_SCRIPT.to_owned(),
        world_name: None,
        include_command_line_api: None,
        run_immediately: None,
    })?;

    tracing::debug!(url, "navigating");
    tab.navigate_to(url)?;
    tab.wait_until_navigated()?;

    dismiss_consent_overlay(&tab);

    // Give client-side rendering a chance to finish.
    std::thread::sleep(config.settle_wait);

    if let Some(condition) = wait_condition {
        wait_for_any_selector(&tab, config, url, condition);
    }

    scroll_through_page(&tab, config.scroll_pause);

    let html = tab.get_content()?;
    let _ = tab.close(true);
    Ok(html)
}

/// Tries each known consent selector in order and clicks the first match.
/// Non-fatal: most pages show no overlay at all.
fn dismiss_consent_overlay(tab: &headless_chrome::Tab) {
    for &selector in CONSENT_SELECTORS {
        if let Ok(element) = tab.find_element(selector) {
            if element.click().is_ok() {
                tracing::debug!(selector, "dismissed consent overlay");
                std::thread::sleep(Duration::from_secs(1));
                return;
            }
        }
    }
    tracing::debug!("no consent overlay found");
}

/// Waits for the first of a comma-separated selector list to appear. Logs
/// and returns if none show up within the per-selector budget.
fn wait_for_any_selector(
    tab: &headless_chrome::Tab,
    config: &BrowserConfig,
    url: &str,
    condition: &str,
) {
    for selector in condition.split(',').map(str::trim) {
        if tab
            .wait_for_element_with_custom_timeout(selector, config.selector_timeout)
            .is_ok()
        {
            tracing::debug!(selector, "wait condition satisfied");
            return;
        }
        tracing::debug!(selector, "selector did not appear");
    }
    tracing::warn!(url, condition, "no wait-condition selector appeared");
}

/// Scrolls down in stages and back up to trigger lazy-loaded content.
/// Scroll failures are ignored; the page content is still worth capturing.
fn scroll_through_page(tab: &headless_chrome::Tab, pause: Duration) {
    const STAGES: &[&str] = &[
        "window.scrollTo(0, document.body.scrollHeight * 0.25)",
        "window.scrollTo(0, document.body.scrollHeight * 0.5)",
        "window.scrollTo(0, document.body.scrollHeight * 0.75)",
        "window.scrollTo(0, document.body.scrollHeight)",
    ];

    for stage in STAGES {
        if tab.evaluate(stage, false).is_err() {
            tracing::debug!("scroll stage failed");
            return;
        }
        std::thread::sleep(pause);
    }

    // Extra pause at the bottom, then return to the top so above-the-fold
    // content is back in view for extraction.
    std::thread::sleep(pause * 3);
    let _ = tab.evaluate("window.scrollTo(0, 0)", false);
    std::thread::sleep(pause);
}
