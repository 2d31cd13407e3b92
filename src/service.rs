//! Report execution pipeline.
//!
//! `report name + params` → catalog lookup → normalization → statement →
//! cache → warehouse (with bounded retry) → column contract check.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::cache::ResultCache;
use crate::config::{RetrySettings, Settings};
use crate::db::{TabularResult, WarehouseClient};
use crate::error::{AnalyticsError, Result};
use crate::report::{QueryBuilder, ReportCatalog, ReportParams, ReportSpec, Statement};
use crate::utils::backoff_delay;

/// Runs named reports against an injected warehouse and memoizes results.
#[derive(Clone)]
pub struct ReportService {
    warehouse: Arc<dyn WarehouseClient>,
    builder: QueryBuilder,
    cache: ResultCache,
    retry: RetrySettings,
}

impl ReportService {
    pub fn new(
        warehouse: Arc<dyn WarehouseClient>,
        builder: QueryBuilder,
        cache: ResultCache,
        retry: RetrySettings,
    ) -> Self {
        Self {
            warehouse,
            builder,
            cache,
            retry,
        }
    }

    pub fn from_settings(warehouse: Arc<dyn WarehouseClient>, settings: &Settings) -> Self {
        Self::new(
            warehouse,
            QueryBuilder::new(&settings.warehouse),
            ResultCache::new(&settings.cache),
            settings.retry.clone(),
        )
    }

    pub fn catalog(&self) -> &'static ReportCatalog {
        ReportCatalog::global()
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn warehouse(&self) -> &Arc<dyn WarehouseClient> {
        &self.warehouse
    }

    pub async fn run(&self, report: &str, params: &ReportParams) -> Result<Arc<TabularResult>> {
        self.run_cancellable(report, params, &CancellationToken::new())
            .await
    }

    /// Run `report`, giving up once `token` is cancelled.
    ///
    /// Cancellation only drops this caller's wait. Another caller waiting on
    /// the same key takes over the computation; with no waiter left nothing
    /// is cached.
    pub async fn run_cancellable(
        &self,
        report: &str,
        params: &ReportParams,
        token: &CancellationToken,
    ) -> Result<Arc<TabularResult>> {
        let spec = self.catalog().get(report)?;
        let params = spec.normalize(params)?;
        let statement = self.builder.build_spec(spec, &params)?;

        if token.is_cancelled() {
            return Err(AnalyticsError::Cancelled(spec.name.to_string()));
        }

        let computation = self.cache.get_or_compute(spec.name, &params, || {
            self.execute_with_retry(spec, &statement)
        });

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("[{}] Computation abandoned, range changed", spec.name);
                Err(AnalyticsError::Cancelled(spec.name.to_string()))
            },
            result = computation => result,
        }
    }

    /// Drop any cached result for `(report, params)` and compute it again.
    pub async fn refresh(&self, report: &str, params: &ReportParams) -> Result<Arc<TabularResult>> {
        let spec = self.catalog().get(report)?;
        let params = spec.normalize(params)?;
        self.cache.invalidate(spec.name, &params).await;
        self.run(spec.name, &params).await
    }

    async fn execute_with_retry(
        &self,
        spec: &ReportSpec,
        statement: &Statement,
    ) -> Result<TabularResult> {
        let mut attempt = 0;
        loop {
            match self.warehouse.execute(statement).await {
                Ok(result) => return result.conform(spec.name, &spec.output_columns),
                Err(e) if e.is_transient() && attempt + 1 < self.retry.max_attempts => {
                    let delay = backoff_delay(self.retry.base_delay_ms, attempt);
                    attempt += 1;
                    warn!(
                        "[{}] Transient failure (attempt {}/{}), retrying in {:?}: {}",
                        spec.name, attempt, self.retry.max_attempts, delay, e
                    );
                    tokio::time::sleep(delay).await;
                },
                Err(e) => {
                    if attempt > 0 {
                        info!("[{}] Giving up after {} attempts", spec.name, attempt + 1);
                    }
                    return Err(e);
                },
            }
        }
    }
}
