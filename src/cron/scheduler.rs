//! Cron scheduler for periodic background tasks.
//!
//! Runs jobs like:
//! - Recomputing the rolling "last 24h" reports so cached figures follow the calendar

use std::sync::Arc;

use anyhow::Result;
use log::{error, info};
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

use crate::config::CronSettings;
use crate::service::ReportService;

use super::jobs;

/// Cron scheduler that manages periodic background jobs.
pub struct CronScheduler {
    service: Arc<ReportService>,
    settings: Arc<CronSettings>,
}

impl CronScheduler {
    pub fn new(service: Arc<ReportService>, settings: CronSettings) -> Self {
        Self {
            service,
            settings: Arc::new(settings),
        }
    }

    /// Starts the cron scheduler and runs until cancellation.
    pub async fn run(&self, cancellation_token: CancellationToken) -> Result<()> {
        let mut scheduler = JobScheduler::new().await?;

        self.register_refresh_rolling_reports_job(&scheduler).await?;

        scheduler.start().await?;
        info!("Cron scheduler started with {} jobs", 1);

        cancellation_token.cancelled().await;
        info!("Cron scheduler shutting down...");

        scheduler.shutdown().await?;
        Ok(())
    }

    async fn register_refresh_rolling_reports_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let service = self.service.clone();
        let interval = self.settings.rolling_refresh_interval_secs;

        let job = Job::new_repeated_async(
            std::time::Duration::from_secs(interval),
            move |_uuid, _lock| {
                let service = service.clone();
                Box::pin(async move {
                    if let Err(e) = jobs::refresh_rolling_reports::run(&service).await {
                        error!("Failed to refresh rolling reports: {:#}", e);
                    }
                })
            },
        )?;

        scheduler.add(job).await?;
        info!(
            "Registered refresh_rolling_reports job (every {}s)",
            interval
        );
        Ok(())
    }
}
