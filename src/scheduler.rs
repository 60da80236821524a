use chrono_tz::Tz;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::offer_update::{OfferUpdate, RefreshCycle};
use crate::utils::error::Result;

/// Fires offer update cycles on the daily and the weekly schedule.
pub struct OfferUpdateScheduler {
    scheduler: JobScheduler,
    update: Arc<OfferUpdate>,
    config: SchedulerConfig,
    job_ids: Vec<Uuid>,
}

impl OfferUpdateScheduler {
    pub async fn new(update: Arc<OfferUpdate>, config: SchedulerConfig) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler,
            update,
            config,
            job_ids: Vec::new(),
        })
    }

    /// Registers both cron jobs and starts ticking. When configured, a first cycle is
    /// dispatched right away and its handle returned.
    pub async fn start(&mut self) -> Result<Option<RefreshCycle>> {
        let timezone = self.config.tz()?;

        for (name, schedule) in [("daily", self.config.daily_cron.clone()), ("weekly", self.config.weekly_cron.clone())] {
            let job = Self::update_job(name, &schedule, timezone, Arc::clone(&self.update))?;
            let job_id = self.scheduler.add(job).await?;
            self.job_ids.push(job_id);
            tracing::info!(job = name, %job_id, schedule = %schedule, %timezone, "scheduled offer update");
        }

        self.scheduler.start().await?;
        tracing::info!("Offer update scheduler started");

        if self.config.run_on_startup {
            tracing::info!("Running offer update on startup");
            return Ok(Some(self.update.update_offers().await));
        }

        Ok(None)
    }

    /// Stops the cron jobs, then waits for running cycles so none is cut off mid-write.
    pub async fn shutdown(&mut self) -> Result<()> {
        for job_id in self.job_ids.drain(..) {
            if let Err(e) = self.scheduler.remove(&job_id).await {
                tracing::warn!(%job_id, error = %e, "failed removing scheduled job");
            }
        }

        self.scheduler.shutdown().await?;

        self.update.shutdown(self.config.shutdown_grace()).await;
        tracing::info!("Offer update scheduler shutdown");
        Ok(())
    }

    pub fn job_ids(&self) -> &[Uuid] {
        &self.job_ids
    }

    fn update_job(name: &'static str, schedule: &str, timezone: Tz, update: Arc<OfferUpdate>) -> Result<Job> {
        let job = Job::new_async_tz(schedule, timezone, move |_uuid, _lock| {
            let update = Arc::clone(&update);
            Box::pin(async move {
                tracing::info!(job = name, "triggered offer update");
                // the cycle stays tracked for shutdown after its handle is dropped
                let _cycle = update.update_offers().await;
            })
        })?;

        Ok(job)
    }
}
