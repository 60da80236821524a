use chrono::NaiveDate;
use chrono_tz::Tz;
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::task::TaskTracker;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::models::{LunchProvider, ProviderId, active_providers};
use crate::repository::LunchOfferRepository;
use crate::utils::error::{AppError, Result};
use crate::utils::time::{monday_last_week, today_in};
use crate::worker::{OfferUpdateWorker, RefreshOutcome};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderRefresh {
    pub provider: ProviderId,
    #[serde(flatten)]
    pub outcome: RefreshOutcome,
}

/// Summary of one finished update cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub horizon: NaiveDate,
    /// Number of purged offers, `None` when the purge failed.
    pub purged: Option<u64>,
    /// One entry per dispatched provider, ordered by provider id.
    pub outcomes: Vec<ProviderRefresh>,
}

impl CycleReport {
    pub fn outcome_of(&self, provider: &ProviderId) -> Option<&RefreshOutcome> {
        self.outcomes
            .iter()
            .find(|refresh| &refresh.provider == provider)
            .map(|refresh| &refresh.outcome)
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|r| r.outcome.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Handle to a dispatched cycle. Dropping it leaves the cycle running.
pub struct RefreshCycle {
    cycle_id: Uuid,
    handle: JoinHandle<CycleReport>,
}

impl RefreshCycle {
    pub fn cycle_id(&self) -> Uuid {
        self.cycle_id
    }

    /// Waits until every worker of the cycle has finished.
    pub async fn wait(self) -> Result<CycleReport> {
        self.handle
            .await
            .map_err(|e| AppError::Internal(format!("update cycle {} did not complete: {}", self.cycle_id, e)))
    }
}

/// Entry point shared by every trigger: purges stale offers, then refreshes every active
/// provider concurrently.
pub struct OfferUpdate {
    repo: Arc<dyn LunchOfferRepository>,
    worker: Arc<OfferUpdateWorker>,
    providers: Arc<Vec<LunchProvider>>,
    timezone: Tz,
    cycles: TaskTracker,
}

impl OfferUpdate {
    pub fn new(
        repo: Arc<dyn LunchOfferRepository>,
        worker: Arc<OfferUpdateWorker>,
        providers: Vec<LunchProvider>,
        timezone: Tz,
    ) -> Self {
        Self {
            repo,
            worker,
            providers: Arc::new(providers),
            timezone,
            cycles: TaskTracker::new(),
        }
    }

    pub fn providers(&self) -> &[LunchProvider] {
        &self.providers
    }

    pub async fn update_offers(&self) -> RefreshCycle {
        self.update_offers_on(today_in(self.timezone)).await
    }

    /// Runs a cycle as if today were `today`.
    ///
    /// Returns once the purge is done and every worker is spawned; the workers themselves
    /// keep running after the returned handle is dropped.
    pub async fn update_offers_on(&self, today: NaiveDate) -> RefreshCycle {
        let cycle_id = Uuid::new_v4();
        let cycle_span = info_span!("offer_update", cycle_id = %cycle_id);
        let horizon = monday_last_week(today);

        let purged = self.purge_before(horizon).instrument(cycle_span.clone()).await;

        let mut tasks = JoinSet::new();
        for provider in active_providers(&self.providers) {
            let worker = Arc::clone(&self.worker);
            let provider = provider.clone();
            let span = info_span!(parent: &cycle_span, "refresh_offers", provider = %provider.id);

            tasks.spawn(
                async move {
                    let outcome = AssertUnwindSafe(worker.refresh_offers_of(&provider))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| {
                            error!(provider = %provider.id, "refresh panicked");
                            RefreshOutcome::Panicked
                        });
                    ProviderRefresh {
                        provider: provider.id,
                        outcome,
                    }
                }
                .instrument(span),
            );
        }

        info!(parent: &cycle_span, %horizon, dispatched = tasks.len(), "dispatched offer refreshes");

        let handle = self.cycles.spawn(
            async move {
                let mut outcomes = Vec::with_capacity(tasks.len());
                while let Some(joined) = tasks.join_next().await {
                    match joined {
                        Ok(refresh) => outcomes.push(refresh),
                        Err(e) => error!(error = %e, "refresh task did not complete"),
                    }
                }
                outcomes.sort_by(|a, b| a.provider.cmp(&b.provider));

                let report = CycleReport {
                    cycle_id,
                    horizon,
                    purged,
                    outcomes,
                };
                info!(
                    succeeded = report.succeeded(),
                    failed = report.failed(),
                    "finished offer update"
                );
                report
            }
            .instrument(cycle_span),
        );

        RefreshCycle { cycle_id, handle }
    }

    /// Number of cycles whose workers are still running.
    pub fn running_cycles(&self) -> usize {
        self.cycles.len()
    }

    /// Waits up to `grace` for every running cycle to finish. Returns `false` when cycles
    /// were still running once the grace period was over.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.cycles.close();
        if self.cycles.is_empty() {
            return true;
        }

        info!(running = self.cycles.len(), grace_secs = grace.as_secs(), "waiting for running offer updates");
        match tokio::time::timeout(grace, self.cycles.wait()).await {
            Ok(()) => {
                info!("running offer updates finished");
                true
            }
            Err(_) => {
                error!(
                    running = self.cycles.len(),
                    "offer updates still running after grace period, abandoning them"
                );
                false
            }
        }
    }

    async fn purge_before(&self, horizon: NaiveDate) -> Option<u64> {
        match self.repo.delete_before(horizon).await {
            Ok(purged) => {
                metrics::counter!("lunchbox_offers_purged_total").increment(purged);
                info!(%horizon, purged, "purged stale offers");
                Some(purged)
            }
            Err(e) => {
                warn!(%horizon, error = %e, "failed purging stale offers, continuing with refresh");
                None
            }
        }
    }
}
