//! Product and review scraping from the shopping site.
//!
//! Every top-level call opens exactly one browser session and quits it
//! before returning, whatever happened in between. Per-product failures
//! degrade to placeholders; they never abort a batch.

mod browser;
mod parse;

pub use browser::{Browser, BrowserSession, WebDriver, WebDriverSession, wait_for};
pub use parse::{PageSelectors, ProductCard, extract_reviews, parse_product_cards};

use crate::config::ScraperConfig;
use crate::error::{AssistantError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Placeholder for a field the page did not provide.
pub const NOT_AVAILABLE: &str = "N/A";

/// `top_reviews` value when no review could be collected.
pub const NO_REVIEWS: &str = "No reviews found";

/// Separator between reviews in `top_reviews`.
pub const REVIEW_SEPARATOR: &str = " || ";

/// One scraped product, as written to the CSV output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub product_id: String,
    #[serde(rename = "product_title")]
    pub title: String,
    pub rating: String,
    pub total_reviews: String,
    pub price: String,
    pub top_reviews: String,
}

/// Result of one review collection session.
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewOutcome {
    /// Distinct review texts, at most the requested count.
    Found(Vec<String>),
    /// The page loaded but had no review text.
    NoneFound,
    /// The browser session failed; carries the reason.
    SessionFailed(String),
}

impl ReviewOutcome {
    /// Flatten into the `top_reviews` column value.
    pub fn into_field(self) -> String {
        match self {
            ReviewOutcome::Found(reviews) => reviews.join(REVIEW_SEPARATOR),
            ReviewOutcome::NoneFound | ReviewOutcome::SessionFailed(_) => NO_REVIEWS.to_string(),
        }
    }
}

/// Drives a [`Browser`] over search and product pages.
pub struct ProductScraper {
    browser: Arc<dyn Browser>,
    selectors: PageSelectors,
    config: ScraperConfig,
    base_url: Url,
}

impl ProductScraper {
    pub fn new(config: ScraperConfig, browser: Arc<dyn Browser>) -> Result<Self> {
        let selectors = PageSelectors::compile(&config.selectors)?;
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            AssistantError::InvalidConfig(format!("Bad base_url '{}': {}", config.base_url, e))
        })?;

        Ok(Self {
            browser,
            selectors,
            config,
            base_url,
        })
    }

    /// Scraper backed by the configured WebDriver server.
    pub fn with_webdriver(config: ScraperConfig) -> Result<Self> {
        let browser = Arc::new(WebDriver::new(&config));
        Self::new(config, browser)
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.config.wait_timeout_ms)
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.poll_interval_ms)
    }

    /// Close the login overlay if it shows up. Failures are ignored.
    async fn dismiss_overlay(&self, session: &dyn BrowserSession) {
        let close = &self.config.selectors.close_button;
        let wait = Duration::from_millis(self.config.overlay_wait_ms);

        match wait_for(session, close, wait, self.poll_interval()).await {
            Ok(true) => {
                if let Err(e) = session.click(close).await {
                    log::debug!("Could not close overlay: {}", e);
                }
            }
            Ok(false) => {}
            Err(e) => log::debug!("Overlay check failed: {}", e),
        }
    }

    async fn read_reviews(
        &self,
        session: &dyn BrowserSession,
        product_url: &str,
        count: usize,
    ) -> Result<Vec<String>> {
        session.goto(product_url).await?;
        self.dismiss_overlay(session).await;

        let pause = Duration::from_millis(self.config.scroll_pause_ms);
        for _ in 0..self.config.scroll_steps {
            session.scroll_viewport().await?;
            tokio::time::sleep(pause).await;
        }

        let review_card = &self.config.selectors.review_card;
        if !wait_for(session, review_card, self.wait_timeout(), self.poll_interval()).await? {
            log::debug!("No review cards rendered on {}", product_url);
        }

        let html = session.page_source().await?;
        Ok(extract_reviews(&html, &self.selectors, count))
    }

    /// Collect up to `count` distinct reviews from a product page.
    pub async fn fetch_reviews(&self, product_url: &str, count: usize) -> ReviewOutcome {
        let session = match self.browser.open_session().await {
            Ok(session) => session,
            Err(e) => {
                log::warn!("Could not start browser for {}: {}", product_url, e);
                return ReviewOutcome::SessionFailed(e.to_string());
            }
        };

        let result = self.read_reviews(session.as_ref(), product_url, count).await;

        if let Err(e) = session.quit().await {
            log::warn!("Failed to quit browser session: {}", e);
        }

        match result {
            Ok(reviews) if reviews.is_empty() => ReviewOutcome::NoneFound,
            Ok(reviews) => ReviewOutcome::Found(reviews),
            Err(e) => {
                log::warn!("Review scrape failed for {}: {}", product_url, e);
                ReviewOutcome::SessionFailed(e.to_string())
            }
        }
    }

    /// Reviews joined by `" || "`, or `"No reviews found"`. Never fails.
    pub async fn fetch_top_reviews(&self, product_url: &str, count: usize) -> String {
        self.fetch_reviews(product_url, count).await.into_field()
    }

    /// Search URL for a free-text query.
    pub fn search_url(&self, query: &str) -> Result<Url> {
        let mut url = self
            .base_url
            .join("search")
            .map_err(|e| AssistantError::InvalidConfig(format!("Bad search URL: {}", e)))?;
        url.query_pairs_mut().append_pair("q", query);
        Ok(url)
    }

    async fn read_search_page(&self, session: &dyn BrowserSession, url: &Url) -> Result<String> {
        session.goto(url.as_str()).await?;
        self.dismiss_overlay(session).await;

        let product_card = &self.config.selectors.product_card;
        if !wait_for(session, product_card, self.wait_timeout(), self.poll_interval()).await? {
            log::warn!("No product cards rendered for {}", url);
        }

        session.page_source().await
    }

    /// Search the site and scrape up to `max_products` products with
    /// their top reviews.
    ///
    /// Fails only when the search page itself cannot be loaded. Cards that
    /// cannot be parsed are skipped with a warning.
    pub async fn search_products(
        &self,
        query: &str,
        max_products: usize,
        review_count: usize,
    ) -> Result<Vec<ProductRecord>> {
        let url = self.search_url(query)?;
        log::info!("Searching products: {}", url);

        let session = self.browser.open_session().await?;
        let html = self.read_search_page(session.as_ref(), &url).await;
        if let Err(e) = session.quit().await {
            log::warn!("Failed to quit browser session: {}", e);
        }
        let html = html?;

        let cards = parse_product_cards(&html, &self.selectors, &self.base_url);
        let mut records = Vec::new();

        for card in cards {
            if records.len() >= max_products {
                break;
            }

            let card = match card {
                Ok(Some(card)) => card,
                Ok(None) => continue,
                Err(e) => {
                    log::warn!("Skipped product due to error: {}", e);
                    continue;
                }
            };

            let top_reviews = self.fetch_top_reviews(&card.link, review_count).await;
            records.push(ProductRecord {
                product_id: card.product_id,
                title: card.title,
                rating: card.rating,
                total_reviews: card.total_reviews,
                price: card.price,
                top_reviews,
            });
        }

        log::info!("Scraped {} products for '{}'", records.len(), query);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use scraper::{Html, Selector};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves canned HTML by URL and counts sessions.
    #[derive(Default)]
    struct StubBrowser {
        pages: HashMap<String, String>,
        opened: Arc<AtomicUsize>,
        quit: Arc<AtomicUsize>,
    }

    impl StubBrowser {
        fn page(mut self, url: &str, html: &str) -> Self {
            self.pages.insert(url.to_string(), html.to_string());
            self
        }
    }

    struct StubSession {
        pages: HashMap<String, String>,
        current: Mutex<Option<String>>,
        quit: Arc<AtomicUsize>,
    }

    impl StubSession {
        fn html(&self) -> Result<String> {
            let current = self.current.lock().unwrap();
            current
                .as_ref()
                .and_then(|url| self.pages.get(url))
                .cloned()
                .ok_or_else(|| AssistantError::WebDriver("no page loaded".to_string()))
        }
    }

    #[async_trait]
    impl Browser for StubBrowser {
        async fn open_session(&self) -> Result<Box<dyn BrowserSession>> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(StubSession {
                pages: self.pages.clone(),
                current: Mutex::new(None),
                quit: self.quit.clone(),
            }))
        }
    }

    #[async_trait]
    impl BrowserSession for StubSession {
        async fn goto(&self, url: &str) -> Result<()> {
            if !self.pages.contains_key(url) {
                return Err(AssistantError::WebDriver(format!("unreachable: {}", url)));
            }
            *self.current.lock().unwrap() = Some(url.to_string());
            Ok(())
        }

        async fn click(&self, css: &str) -> Result<bool> {
            self.is_present(css).await
        }

        async fn is_present(&self, css: &str) -> Result<bool> {
            let html = self.html()?;
            let selector = Selector::parse(css).unwrap();
            Ok(Html::parse_document(&html).select(&selector).next().is_some())
        }

        async fn scroll_viewport(&self) -> Result<()> {
            Ok(())
        }

        async fn page_source(&self) -> Result<String> {
            self.html()
        }

        async fn quit(&self) -> Result<()> {
            self.quit.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn instant_config() -> ScraperConfig {
        ScraperConfig {
            scroll_steps: 2,
            scroll_pause_ms: 0,
            overlay_wait_ms: 0,
            wait_timeout_ms: 0,
            poll_interval_ms: 0,
            ..ScraperConfig::default()
        }
    }

    const PRODUCT_URL: &str = "https://www.flipkart.com/phone-x/p/itm1?pid=MOBX1";

    const REVIEWS_PAGE: &str = r#"
        <html><body>
          <button aria-label="Close">x</button>
          <div class="xgU6qg">
            <div class="mlW33x"><div class="G4PxIA"><div><div>Battery lasts two days</div></div></div></div>
            <div class="mlW33x"><div class="G4PxIA"><div><div>Battery lasts two days</div></div></div></div>
            <div class="mlW33x"><div class="G4PxIA"><div><div>Display is bright</div></div></div></div>
          </div>
        </body></html>
    "#;

    fn search_page() -> String {
        let card = |id: &str, pid: &str| {
            format!(
                r#"<div data-id="{id}">
                     <a href="/item-{id}/p/itm?pid={pid}">Phone {id}</a>
                     <div class="XQDdHH">4.2</div>
                     <div>₹9,999</div>
                     <span>321 Reviews</span>
                   </div>"#
            )
        };
        format!(
            r#"<html><body>
                 {}
                 <div data-id="bad"><a href="http://[bad">Broken</a></div>
                 {}
                 {}
               </body></html>"#,
            card("a", "PIDA"),
            card("b", "PIDB"),
            card("c", "PIDC"),
        )
    }

    fn scraper(browser: StubBrowser) -> ProductScraper {
        ProductScraper::new(instant_config(), Arc::new(browser)).unwrap()
    }

    #[tokio::test]
    async fn test_top_reviews_dedup_and_join() {
        let browser = StubBrowser::default().page(PRODUCT_URL, REVIEWS_PAGE);
        let quit = browser.quit.clone();
        let scraper = scraper(browser);

        let reviews = scraper.fetch_top_reviews(PRODUCT_URL, 2).await;
        assert_eq!(reviews, "Battery lasts two days || Display is bright");
        assert_eq!(quit.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_reviews_found() {
        let browser = StubBrowser::default().page(PRODUCT_URL, "<html><body></body></html>");
        let scraper = scraper(browser);

        assert_eq!(
            scraper.fetch_reviews(PRODUCT_URL, 2).await,
            ReviewOutcome::NoneFound
        );
        assert_eq!(scraper.fetch_top_reviews(PRODUCT_URL, 2).await, NO_REVIEWS);
    }

    #[tokio::test]
    async fn test_session_failure_still_quits() {
        let browser = StubBrowser::default();
        let (opened, quit) = (browser.opened.clone(), browser.quit.clone());
        let scraper = scraper(browser);

        let outcome = scraper.fetch_reviews("https://unreachable.example/", 2).await;
        assert!(matches!(outcome, ReviewOutcome::SessionFailed(_)));
        assert_eq!(outcome.into_field(), NO_REVIEWS);
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert_eq!(quit.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_search_url_encodes_query() {
        let scraper = scraper(StubBrowser::default());
        let url = scraper.search_url("samsung phone").unwrap();
        assert_eq!(url.as_str(), "https://www.flipkart.com/search?q=samsung+phone");
    }

    #[tokio::test]
    async fn test_search_products_limits_and_skips_bad_cards() {
        let stub = scraper(StubBrowser::default());
        let search_url = stub.search_url("phone").unwrap().to_string();

        let browser = StubBrowser::default()
            .page(&search_url, &search_page())
            .page(
                "https://www.flipkart.com/item-a/p/itm?pid=PIDA",
                REVIEWS_PAGE,
            );
        let (opened, quit) = (browser.opened.clone(), browser.quit.clone());
        let scraper = scraper(browser);

        let records = scraper.search_products("phone", 2, 1).await.unwrap();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].product_id, "PIDA");
        assert_eq!(records[0].title, "Phone a");
        assert_eq!(records[0].rating, "4.2");
        assert_eq!(records[0].price, "₹9,999");
        assert_eq!(records[0].total_reviews, "321");
        assert_eq!(records[0].top_reviews, "Battery lasts two days");

        // The malformed card is skipped; card b has no reachable product page
        assert_eq!(records[1].product_id, "PIDB");
        assert_eq!(records[1].top_reviews, NO_REVIEWS);

        // One search session plus one per product, each quit
        assert_eq!(opened.load(Ordering::SeqCst), 3);
        assert_eq!(quit.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_search_page_failure_is_an_error() {
        let browser = StubBrowser::default();
        let quit = browser.quit.clone();
        let scraper = scraper(browser);

        assert!(scraper.search_products("phone", 5, 2).await.is_err());
        assert_eq!(quit.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_records_have_every_field() {
        let stub = scraper(StubBrowser::default());
        let search_url = stub.search_url("bare").unwrap().to_string();
        let browser = StubBrowser::default().page(
            &search_url,
            r#"<div data-id="x"><a href="/bare-item"></a></div>"#,
        );
        let scraper = scraper(browser);

        let records = scraper.search_products("bare", 10, 2).await.unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        for field in [
            &record.product_id,
            &record.title,
            &record.rating,
            &record.total_reviews,
            &record.price,
        ] {
            assert_eq!(field, NOT_AVAILABLE);
        }
        assert_eq!(record.top_reviews, NO_REVIEWS);
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let config = ScraperConfig {
            base_url: "not a url".to_string(),
            ..instant_config()
        };
        let err = ProductScraper::new(config, Arc::new(StubBrowser::default())).err();
        assert!(err.is_some_and(|e| e.is_configuration()));
    }
}
