use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::models::ProviderId;

/// Catalog entry for one lunch provider. Read-only once the catalog is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LunchProvider {
    pub id: ProviderId,
    pub label: String,
    pub location: String,
    pub active: bool,
}

impl LunchProvider {
    pub fn new(id: impl Into<ProviderId>, label: &str, location: &str, active: bool) -> Self {
        Self {
            id: id.into(),
            label: label.to_string(),
            location: location.to_string(),
            active,
        }
    }
}

impl From<&ProviderConfig> for LunchProvider {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            id: ProviderId::new(config.id.clone()),
            label: config.label.clone(),
            location: config.location.clone(),
            active: config.active,
        }
    }
}

/// Builds the catalog in configuration order.
pub fn catalog_from_config(providers: &[ProviderConfig]) -> Vec<LunchProvider> {
    providers.iter().map(LunchProvider::from).collect()
}

/// Providers that take part in update cycles.
pub fn active_providers(catalog: &[LunchProvider]) -> impl Iterator<Item = &LunchProvider> {
    catalog.iter().filter(|provider| provider.active)
}
