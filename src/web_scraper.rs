use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::ScraperConfig;
use crate::utils::error::{AppError, Result};

/// Fetches web pages for resolvers. Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct WebScraper {
    client: Client,
}

impl WebScraper {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.request_timeout))
            .build()?;

        Ok(Self { client })
    }

    /// Downloads the page at `url`; non-2xx answers are errors.
    pub async fn fetch_document(&self, url: &Url) -> Result<String> {
        let start_time = std::time::Instant::now();

        let response = self.client.get(url.clone()).send().await?.error_for_status()?;
        let html = response.text().await?;

        debug!(%url, bytes = html.len(), elapsed_ms = start_time.elapsed().as_millis() as u64, "fetched page");
        Ok(html)
    }
}

pub fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| AppError::Parse {
        message: format!("invalid CSS selector '{}': {:?}", selector, e),
    })
}

/// Whitespace-normalised text content of an element.
pub fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text of the first element below `scope` matching `selector`.
pub fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope
        .select(selector)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty())
}

/// Value of `attr` on every element in the document matching `selector`.
pub fn select_attr(html: &str, selector: &Selector, attr: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(selector)
        .filter_map(|element| element.value().attr(attr))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}
