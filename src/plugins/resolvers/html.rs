use async_trait::async_trait;
use chrono::NaiveDate;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use crate::models::{Money, ProviderId, ResolvedOffer};
use crate::plugins::resolvers::text::{clean_name, parse_day, parse_price};
use crate::plugins::traits::LunchResolver;
use crate::utils::error::{AppError, Result};
use crate::utils::time::today_in;
use crate::web_scraper::{WebScraper, first_text, parse_selector};

pub struct MenuSelectors {
    pub item: Selector,
    pub name: Selector,
    pub price: Selector,
    pub day: Selector,
}

impl MenuSelectors {
    pub fn parse(item: &str, name: &str, price: &str, day: &str) -> Result<Self> {
        Ok(Self {
            item: parse_selector(item)?,
            name: parse_selector(name)?,
            price: parse_selector(price)?,
            day: parse_selector(day)?,
        })
    }
}

/// Reads offers from an HTML menu where every item carries its own name, price and day.
pub struct HtmlMenuResolver {
    provider: ProviderId,
    url: Url,
    selectors: MenuSelectors,
    scraper: WebScraper,
    timezone: chrono_tz::Tz,
}

impl HtmlMenuResolver {
    pub fn new(
        provider: ProviderId,
        url: Url,
        selectors: MenuSelectors,
        scraper: WebScraper,
        timezone: chrono_tz::Tz,
    ) -> Self {
        Self {
            provider,
            url,
            selectors,
            scraper,
            timezone,
        }
    }

    /// Extracts every complete menu item of `html`. Incomplete items are skipped.
    pub fn parse_menu(&self, html: &str, today: NaiveDate) -> Vec<ResolvedOffer> {
        let document = Html::parse_document(html);
        let mut offers = Vec::new();

        for item in document.select(&self.selectors.item) {
            let name = first_text(item, &self.selectors.name).map(|n| clean_name(&n));
            let price = first_text(item, &self.selectors.price).and_then(|p| parse_price(&p));
            let day: Option<NaiveDate> = first_text(item, &self.selectors.day).and_then(|d| parse_day(&d, today));

            match (name, price, day) {
                (Some(name), Some(amount), Some(day)) if !name.is_empty() => {
                    offers.push(ResolvedOffer::new(name, day, Money::eur(amount)));
                }
                (name, price, day) => {
                    debug!(
                        provider = %self.provider,
                        ?name,
                        ?price,
                        ?day,
                        "skipping incomplete menu item"
                    );
                }
            }
        }

        offers
    }
}

#[async_trait]
impl LunchResolver for HtmlMenuResolver {
    fn provider(&self) -> &ProviderId {
        &self.provider
    }

    fn kind(&self) -> &'static str {
        "html"
    }

    async fn resolve(&self) -> Result<Vec<ResolvedOffer>> {
        let html = self.scraper.fetch_document(&self.url).await.map_err(|e| AppError::Resolver {
            provider: self.provider.clone(),
            message: format!("fetching {} failed: {}", self.url, e),
        })?;

        Ok(self.parse_menu(&html, today_in(self.timezone)))
    }
}
