// Integration tests for Lunchbox
// These tests run whole update cycles against an in-memory store

pub mod ocr_tests;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use lunchbox::config::{OcrConfig, ScraperConfig};
use lunchbox::models::{LunchProvider, Money, NewLunchOffer, ProviderId, ResolvedOffer};
use lunchbox::plugins::{LunchResolver, ResolverRegistry};
pub use lunchbox::plugins::manager::ResolverRef;
use lunchbox::repository::{LunchOfferRepository, SqliteOfferRepository};
use lunchbox::{AppError, OfferUpdate, OfferUpdateWorker};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn resolved(name: &str, day: NaiveDate) -> ResolvedOffer {
    ResolvedOffer::new(name, day, Money::eur(Decimal::new(590, 2)))
}

pub fn stored(provider: &str, name: &str, day: NaiveDate) -> NewLunchOffer {
    resolved(name, day).for_provider(&ProviderId::from(provider))
}

pub fn active(id: &str) -> LunchProvider {
    LunchProvider::new(id, id, "Neubrandenburg", true)
}

pub fn inactive(id: &str) -> LunchProvider {
    LunchProvider::new(id, id, "Neubrandenburg", false)
}

pub async fn test_repo() -> Arc<SqliteOfferRepository> {
    Arc::new(SqliteOfferRepository::in_memory().await.expect("in-memory database"))
}

pub fn test_scraper_config() -> ScraperConfig {
    ScraperConfig {
        user_agent: "Lunchbox-Test/1.0".to_string(),
        request_timeout: 5,
    }
}

/// OCR settings with short delays: 50 ms doubling up to 400 ms.
pub fn test_ocr_config(server_url: &str, max_attempts: u32) -> OcrConfig {
    OcrConfig {
        server_url: server_url.to_string(),
        engine: "tesseract".to_string(),
        language: "deu".to_string(),
        max_attempts,
        min_backoff_ms: 50,
        max_backoff_ms: 400,
        request_timeout: 5,
    }
}

pub fn build_update(
    repo: Arc<SqliteOfferRepository>,
    resolvers: Vec<ResolverRef>,
    providers: Vec<LunchProvider>,
    resolve_timeout: Duration,
) -> OfferUpdate {
    let mut registry = ResolverRegistry::new();
    for resolver in resolvers {
        registry.register_resolver(resolver);
    }

    let worker = Arc::new(OfferUpdateWorker::new(repo.clone(), Arc::new(registry), resolve_timeout));
    OfferUpdate::new(repo, worker, providers, chrono_tz::Europe::Berlin)
}

pub async fn names_of(repo: &SqliteOfferRepository, provider: &str) -> Vec<(String, NaiveDate)> {
    repo.find_all()
        .await
        .unwrap()
        .into_iter()
        .filter(|offer| offer.provider.as_str() == provider)
        .map(|offer| (offer.name, offer.day))
        .collect()
}

/// Polls `condition` every 20 ms until it holds or `timeout` passes.
pub async fn wait_for_condition<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// Makes the next insert of an offer called `name` abort its statement.
pub async fn reject_offers_named(repo: &SqliteOfferRepository, name: &str) {
    let sql = format!(
        "CREATE TRIGGER reject_{name} BEFORE INSERT ON lunch_offers WHEN NEW.name = '{name}' \
         BEGIN SELECT RAISE(ABORT, 'rejected offer'); END"
    );
    sqlx::query(&sql).execute(repo.pool()).await.unwrap();
}

/// Returns a fixed set of offers and counts how often it was asked.
pub struct StaticResolver {
    provider: ProviderId,
    offers: Vec<ResolvedOffer>,
    calls: Arc<AtomicUsize>,
}

impl StaticResolver {
    pub fn new(provider: &str, offers: Vec<ResolvedOffer>) -> Self {
        Self {
            provider: ProviderId::from(provider),
            offers,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl LunchResolver for StaticResolver {
    fn provider(&self) -> &ProviderId {
        &self.provider
    }

    fn kind(&self) -> &'static str {
        "static"
    }

    async fn resolve(&self) -> lunchbox::Result<Vec<ResolvedOffer>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.offers.clone())
    }
}

pub struct FailingResolver {
    provider: ProviderId,
}

impl FailingResolver {
    pub fn new(provider: &str) -> Self {
        Self {
            provider: ProviderId::from(provider),
        }
    }
}

#[async_trait]
impl LunchResolver for FailingResolver {
    fn provider(&self) -> &ProviderId {
        &self.provider
    }

    fn kind(&self) -> &'static str {
        "failing"
    }

    async fn resolve(&self) -> lunchbox::Result<Vec<ResolvedOffer>> {
        Err(AppError::Resolver {
            provider: self.provider.clone(),
            message: "menu page unreachable".to_string(),
        })
    }
}

/// Sleeps for `delay` before answering with its offers.
pub struct SlowResolver {
    provider: ProviderId,
    delay: Duration,
    offers: Vec<ResolvedOffer>,
}

impl SlowResolver {
    pub fn new(provider: &str, delay: Duration, offers: Vec<ResolvedOffer>) -> Self {
        Self {
            provider: ProviderId::from(provider),
            delay,
            offers,
        }
    }
}

#[async_trait]
impl LunchResolver for SlowResolver {
    fn provider(&self) -> &ProviderId {
        &self.provider
    }

    fn kind(&self) -> &'static str {
        "slow"
    }

    async fn resolve(&self) -> lunchbox::Result<Vec<ResolvedOffer>> {
        tokio::time::sleep(self.delay).await;
        Ok(self.offers.clone())
    }
}
