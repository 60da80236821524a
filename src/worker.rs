use chrono::NaiveDate;
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::models::{LunchProvider, earliest_day};
use crate::plugins::ResolverRegistry;
use crate::repository::LunchOfferRepository;

/// What a single refresh of one provider ended with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// No resolver is registered for the provider.
    NoResolver,
    /// The resolver failed; stored offers were left alone.
    Failed { error: String },
    /// The resolver did not finish in time; stored offers were left alone.
    TimedOut,
    /// The resolver panicked; stored offers were left alone.
    Panicked,
    /// The resolver found nothing; stored offers were left alone.
    Empty,
    /// Offers from `from` onwards were replaced.
    Replaced { from: NaiveDate, deleted: u64, inserted: usize },
    /// Resolving worked but the replacement could not be committed.
    StoreFailed { error: String },
}

impl RefreshOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RefreshOutcome::NoResolver => "no_resolver",
            RefreshOutcome::Failed { .. } => "failed",
            RefreshOutcome::TimedOut => "timed_out",
            RefreshOutcome::Panicked => "panicked",
            RefreshOutcome::Empty => "empty",
            RefreshOutcome::Replaced { .. } => "replaced",
            RefreshOutcome::StoreFailed { .. } => "store_failed",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RefreshOutcome::Replaced { .. } | RefreshOutcome::Empty)
    }
}

/// Refreshes the stored offers of one provider at a time.
///
/// A refresh never fails towards its caller; every problem ends up as a [`RefreshOutcome`]
/// and a log line.
pub struct OfferUpdateWorker {
    repo: Arc<dyn LunchOfferRepository>,
    resolvers: Arc<ResolverRegistry>,
    resolve_timeout: Duration,
}

impl OfferUpdateWorker {
    pub fn new(
        repo: Arc<dyn LunchOfferRepository>,
        resolvers: Arc<ResolverRegistry>,
        resolve_timeout: Duration,
    ) -> Self {
        Self {
            repo,
            resolvers,
            resolve_timeout,
        }
    }

    pub async fn refresh_offers_of(&self, provider: &LunchProvider) -> RefreshOutcome {
        let start_time = Instant::now();
        let outcome = self.refresh(provider).await;

        metrics::counter!(
            "lunchbox_offer_refresh_total",
            "provider" => provider.id.to_string(),
            "outcome" => outcome.label()
        )
        .increment(1);
        metrics::histogram!("lunchbox_offer_refresh_seconds", "provider" => provider.id.to_string())
            .record(start_time.elapsed().as_secs_f64());

        outcome
    }

    async fn refresh(&self, provider: &LunchProvider) -> RefreshOutcome {
        let Some(resolver) = self.resolvers.get(&provider.id) else {
            error!(provider = %provider.id, "no resolver for provider");
            return RefreshOutcome::NoResolver;
        };

        info!(provider = %provider.id, kind = resolver.kind(), "start resolving offers");

        let resolving = AssertUnwindSafe(async { resolver.resolve().await }).catch_unwind();
        let offers = match tokio::time::timeout(self.resolve_timeout, resolving).await {
            Ok(Ok(Ok(offers))) => offers,
            Ok(Ok(Err(e))) => {
                error!(provider = %provider.id, error = %e, "failed resolving offers");
                return RefreshOutcome::Failed { error: e.to_string() };
            }
            Ok(Err(_panic)) => {
                error!(provider = %provider.id, "resolver panicked");
                return RefreshOutcome::Panicked;
            }
            Err(_elapsed) => {
                error!(
                    provider = %provider.id,
                    timeout_secs = self.resolve_timeout.as_secs(),
                    "resolving offers timed out"
                );
                return RefreshOutcome::TimedOut;
            }
        };

        info!(provider = %provider.id, count = offers.len(), "finished resolving offers");

        let Some(from) = earliest_day(&offers) else {
            warn!(provider = %provider.id, "resolver returned no offers, keeping stored ones");
            return RefreshOutcome::Empty;
        };

        let new_offers: Vec<_> = offers
            .into_iter()
            .map(|offer| offer.for_provider(&provider.id))
            .collect();

        match self.repo.replace_from(from, &provider.id, new_offers).await {
            Ok(replacement) => {
                info!(
                    provider = %provider.id,
                    from = %from,
                    deleted = replacement.deleted,
                    inserted = replacement.inserted.len(),
                    "replaced offers"
                );
                RefreshOutcome::Replaced {
                    from,
                    deleted: replacement.deleted,
                    inserted: replacement.inserted.len(),
                }
            }
            Err(e) => {
                error!(provider = %provider.id, error = %e, "failed storing offers");
                RefreshOutcome::StoreFailed { error: e.to_string() }
            }
        }
    }
}
