use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use url::Url;

use super::resolvers::html::MenuSelectors;
use super::resolvers::{HtmlMenuResolver, OcrMenuResolver};
use super::traits::LunchResolver;
use crate::config::{ProviderConfig, ResolverConfig};
use crate::models::ProviderId;
use crate::ocr::OcrClient;
use crate::utils::error::{AppError, Result};
use crate::web_scraper::{WebScraper, parse_selector};

pub type ResolverRef = Arc<dyn LunchResolver>;

/// Lookup of resolvers by the provider they serve.
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    resolvers: HashMap<ProviderId, ResolverRef>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `resolver` under its own provider id, replacing any earlier registration.
    pub fn register_resolver(&mut self, resolver: ResolverRef) {
        let provider = resolver.provider().clone();
        if self.resolvers.insert(provider.clone(), resolver).is_some() {
            tracing::warn!(%provider, "replacing previously registered resolver");
        }
    }

    pub fn get(&self, provider: &ProviderId) -> Option<ResolverRef> {
        self.resolvers.get(provider).cloned()
    }

    pub fn has_resolver(&self, provider: &ProviderId) -> bool {
        self.resolvers.contains_key(provider)
    }

    pub fn list_provider_ids(&self) -> Vec<ProviderId> {
        let mut ids: Vec<_> = self.resolvers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    /// Builds one resolver per provider entry that declares one.
    pub fn from_providers(
        providers: &[ProviderConfig],
        scraper: &WebScraper,
        ocr: Arc<OcrClient>,
        timezone: chrono_tz::Tz,
    ) -> Result<Self> {
        let mut registry = Self::new();

        for provider in providers {
            let Some(config) = &provider.resolver else {
                continue;
            };

            let id = ProviderId::new(provider.id.clone());
            let resolver: ResolverRef = match config {
                ResolverConfig::Html {
                    url,
                    item_selector,
                    name_selector,
                    price_selector,
                    day_selector,
                } => Arc::new(HtmlMenuResolver::new(
                    id.clone(),
                    parse_url(&id, url)?,
                    MenuSelectors::parse(item_selector, name_selector, price_selector, day_selector)?,
                    scraper.clone(),
                    timezone,
                )),
                ResolverConfig::OcrImage {
                    page_url,
                    image_selector,
                } => Arc::new(OcrMenuResolver::new(
                    id.clone(),
                    parse_url(&id, page_url)?,
                    parse_selector(image_selector)?,
                    scraper.clone(),
                    Arc::clone(&ocr),
                    timezone,
                )),
            };

            info!(provider = %id, kind = resolver.kind(), "registered resolver");
            registry.register_resolver(resolver);
        }

        Ok(registry)
    }
}

fn parse_url(provider: &ProviderId, url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| AppError::Validation(format!("provider {}: invalid URL '{}': {}", provider, url, e)))
}
