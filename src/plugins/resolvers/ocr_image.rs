use async_trait::async_trait;
use scraper::Selector;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use crate::models::{ProviderId, ResolvedOffer};
use crate::ocr::OcrClient;
use crate::plugins::resolvers::text::parse_menu_text;
use crate::plugins::traits::LunchResolver;
use crate::utils::error::{AppError, Result};
use crate::utils::time::today_in;
use crate::web_scraper::{WebScraper, select_attr};

/// Reads offers from a menu published as an image: the image is located on a web page,
/// sent through OCR and the recognised text is parsed line by line.
pub struct OcrMenuResolver {
    provider: ProviderId,
    page_url: Url,
    image_selector: Selector,
    scraper: WebScraper,
    ocr: Arc<OcrClient>,
    timezone: chrono_tz::Tz,
}

impl OcrMenuResolver {
    pub fn new(
        provider: ProviderId,
        page_url: Url,
        image_selector: Selector,
        scraper: WebScraper,
        ocr: Arc<OcrClient>,
        timezone: chrono_tz::Tz,
    ) -> Self {
        Self {
            provider,
            page_url,
            image_selector,
            scraper,
            ocr,
            timezone,
        }
    }

    /// Absolute URL of the first menu image on the page.
    pub fn find_image_url(&self, html: &str) -> Result<Url> {
        let src = select_attr(html, &self.image_selector, "src")
            .into_iter()
            .next()
            .ok_or_else(|| self.failure(format!("no menu image found on {}", self.page_url)))?;

        Ok(self.page_url.join(&src)?)
    }

    fn failure(&self, message: String) -> AppError {
        AppError::Resolver {
            provider: self.provider.clone(),
            message,
        }
    }
}

#[async_trait]
impl LunchResolver for OcrMenuResolver {
    fn provider(&self) -> &ProviderId {
        &self.provider
    }

    fn kind(&self) -> &'static str {
        "ocr_image"
    }

    async fn resolve(&self) -> Result<Vec<ResolvedOffer>> {
        let html = self
            .scraper
            .fetch_document(&self.page_url)
            .await
            .map_err(|e| self.failure(format!("fetching {} failed: {}", self.page_url, e)))?;

        let image_url = self.find_image_url(&html)?;
        info!(provider = %self.provider, image = %image_url, "recognizing menu image");

        let text = self.ocr.recognize_text(&image_url).await?;
        debug!(provider = %self.provider, chars = text.len(), "menu image recognized");

        Ok(parse_menu_text(&text, today_in(self.timezone)))
    }
}
