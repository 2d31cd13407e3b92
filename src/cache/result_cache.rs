use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use moka::future::Cache;

use crate::config::CacheSettings;
use crate::db::TabularResult;
use crate::error::Result;
use crate::report::ReportParams;

/// Exact identity of a cached result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub report: String,
    /// Serialized normalized parameters
    pub params: String,
}

impl CacheKey {
    pub fn new(report: &str, params: &ReportParams) -> Self {
        Self {
            report: report.to_string(),
            params: params.cache_key(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Arc<TabularResult>,
    pub created_at: DateTime<Utc>,
}

/// Bounded, concurrent result cache.
///
/// Concurrent calls for the same key share one computation. Failed
/// computations are handed to every waiter and never stored.
#[derive(Clone)]
pub struct ResultCache {
    entries: Cache<CacheKey, CacheEntry>,
}

impl ResultCache {
    pub fn new(settings: &CacheSettings) -> Self {
        let mut builder = Cache::builder().max_capacity(settings.max_capacity);
        if let Some(ttl) = settings.time_to_live_secs {
            builder = builder.time_to_live(Duration::from_secs(ttl));
        }

        Self {
            entries: builder.build(),
        }
    }

    /// Return the cached result for `(report, params)` or run `compute` and
    /// store what it yields.
    pub async fn get_or_compute<F, Fut>(
        &self,
        report: &str,
        params: &ReportParams,
        compute: F,
    ) -> Result<Arc<TabularResult>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<TabularResult>>,
    {
        let key = CacheKey::new(report, params);

        let init = async move {
            compute().await.map(|result| CacheEntry {
                value: Arc::new(result),
                created_at: Utc::now(),
            })
        };

        match self.entries.entry(key).or_try_insert_with(init).await {
            Ok(entry) => {
                if entry.is_fresh() {
                    debug!("[{}] Cache miss, result stored", report);
                } else {
                    debug!("[{}] Cache hit", report);
                }
                Ok(entry.into_value().value)
            },
            Err(e) => {
                warn!("[{}] Computation failed, nothing cached: {}", report, e);
                Err((*e).clone())
            },
        }
    }

    pub async fn get(&self, report: &str, params: &ReportParams) -> Option<CacheEntry> {
        self.entries.get(&CacheKey::new(report, params)).await
    }

    pub async fn invalidate(&self, report: &str, params: &ReportParams) {
        self.entries.invalidate(&CacheKey::new(report, params)).await;
    }

    pub fn invalidate_all(&self) {
        self.entries.invalidate_all();
    }

    /// Number of stored entries once pending maintenance has run.
    pub async fn len(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::NaiveDate;

    use super::*;
    use crate::db::{ColumnSpec, SemanticType, Value};
    use crate::error::AnalyticsError;
    use crate::report::DateRange;

    fn params(day: u32) -> ReportParams {
        ReportParams::for_range(
            &DateRange::new(
                NaiveDate::from_ymd_opt(2022, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2022, 1, day).unwrap(),
            )
            .unwrap(),
        )
    }

    fn totals(swaps: i64) -> TabularResult {
        let mut result = TabularResult::from_specs(&[ColumnSpec::new(
            "total_swaps",
            SemanticType::Count,
        )]);
        result.push_row(vec![Value::Int(swaps)]);
        result
    }

    #[tokio::test]
    async fn test_second_call_is_served_from_cache() {
        let cache = ResultCache::new(&CacheSettings::default());
        let calls = &AtomicUsize::new(0);

        let first = cache
            .get_or_compute("swap_totals", &params(31), || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(totals(3))
            })
            .await
            .unwrap();
        let second = cache
            .get_or_compute("swap_totals", &params(31), || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(totals(99))
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
        assert_eq!(second.value(0, "total_swaps"), Some(&Value::Int(3)));
    }

    #[tokio::test]
    async fn test_distinct_params_are_distinct_keys() {
        let cache = ResultCache::new(&CacheSettings::default());
        cache
            .get_or_compute("swap_totals", &params(30), || async { Ok(totals(1)) })
            .await
            .unwrap();
        let other = cache
            .get_or_compute("swap_totals", &params(31), || async { Ok(totals(2)) })
            .await
            .unwrap();

        assert_eq!(other.value(0, "total_swaps"), Some(&Value::Int(2)));
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let cache = ResultCache::new(&CacheSettings::default());
        let err = cache
            .get_or_compute("swap_totals", &params(31), || async {
                Err(AnalyticsError::Cancelled("swap_totals".to_string()))
            })
            .await
            .unwrap_err();
        assert_eq!(err, AnalyticsError::Cancelled("swap_totals".to_string()));
        assert!(cache.get("swap_totals", &params(31)).await.is_none());

        let result = cache
            .get_or_compute("swap_totals", &params(31), || async { Ok(totals(3)) })
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_identical_requests_share_one_computation() {
        let cache = ResultCache::new(&CacheSettings::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let compute = |calls: Arc<AtomicUsize>| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(totals(3))
        };

        let p = params(31);
        let (a, b) = tokio::join!(
            cache.get_or_compute("swap_totals", &p, || compute(calls.clone())),
            cache.get_or_compute("swap_totals", &p, || compute(calls.clone())),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.unwrap(), b.unwrap());
    }

    #[tokio::test]
    async fn test_invalidate_forces_recompute() {
        let cache = ResultCache::new(&CacheSettings::default());
        cache
            .get_or_compute("swap_totals", &params(31), || async { Ok(totals(3)) })
            .await
            .unwrap();
        let stored = cache.get("swap_totals", &params(31)).await.unwrap();
        assert!(stored.created_at <= Utc::now());

        cache.invalidate("swap_totals", &params(31)).await;
        let fresh = cache
            .get_or_compute("swap_totals", &params(31), || async { Ok(totals(4)) })
            .await
            .unwrap();
        assert_eq!(fresh.value(0, "total_swaps"), Some(&Value::Int(4)));

        cache.invalidate_all();
        assert!(cache.is_empty().await);
    }
}
