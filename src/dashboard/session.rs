use std::sync::Arc;

use log::info;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::dashboard::{render_page, Page, RenderedPage};
use crate::error::Result;
use crate::report::DateRange;
use crate::service::ReportService;

struct SessionState {
    range: DateRange,
    token: CancellationToken,
}

/// One viewer's dashboard state: the selected range and a token that is
/// cancelled whenever that range changes, so computations for a stale range
/// are abandoned instead of cached.
pub struct DashboardSession {
    service: Arc<ReportService>,
    state: RwLock<SessionState>,
}

impl DashboardSession {
    pub fn new(service: Arc<ReportService>, range: DateRange) -> Self {
        Self {
            service,
            state: RwLock::new(SessionState {
                range,
                token: CancellationToken::new(),
            }),
        }
    }

    pub async fn range(&self) -> DateRange {
        self.state.read().await.range
    }

    /// Select a new range. Setting the current range again is a no-op.
    pub async fn set_range(&self, range: DateRange) {
        let mut state = self.state.write().await;
        if state.range == range {
            return;
        }

        info!(
            "Date range changed from {}..{} to {}..{}, cancelling in-flight reports",
            state.range.start(),
            state.range.end(),
            range.start(),
            range.end()
        );
        state.token.cancel();
        state.range = range;
        state.token = CancellationToken::new();
    }

    pub async fn render(&self, page: Page) -> Result<RenderedPage> {
        let (range, token) = {
            let state = self.state.read().await;
            (state.range, state.token.clone())
        };
        render_page(&self.service, page, &range, &token).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::NaiveDate;

    use super::*;
    use crate::cache::ResultCache;
    use crate::config::{CacheSettings, RetrySettings};
    use crate::db::models::SwapRecord;
    use crate::db::{InMemoryWarehouse, TabularResult, WarehouseClient};
    use crate::error::AnalyticsError;
    use crate::report::{names, QueryBuilder, ReportParams, Statement};

    struct SlowWarehouse(InMemoryWarehouse);

    #[async_trait]
    impl WarehouseClient for SlowWarehouse {
        async fn execute(&self, statement: &Statement) -> Result<TabularResult> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            self.0.execute(statement).await
        }
    }

    fn range(end_day: u32) -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2022, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2022, 1, end_day).unwrap(),
        )
        .unwrap()
    }

    fn service() -> Arc<ReportService> {
        let at = NaiveDate::from_ymd_opt(2022, 1, 3)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let warehouse = SlowWarehouse(InMemoryWarehouse::new(
            vec![SwapRecord::new(at, "0x1", "A", "ethereum", "polygon", "USDC")],
            vec![],
        ));
        let service = ReportService::new(
            Arc::new(warehouse),
            QueryBuilder::default(),
            ResultCache::new(&CacheSettings::default()),
            RetrySettings::default(),
        );
        Arc::new(service)
    }

    fn session() -> DashboardSession {
        DashboardSession::new(service(), range(31))
    }

    #[tokio::test]
    async fn test_range_change_cancels_in_flight_render() {
        let session = session();

        let (stale, _) = tokio::join!(session.render(Page::ChainActivity), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            session.set_range(range(15)).await;
        });
        assert!(matches!(stale.unwrap_err(), AnalyticsError::Cancelled(_)));

        // nothing was cached for the abandoned range
        let stale_params = ReportParams::for_range(&range(31));
        assert!(session
            .service
            .cache()
            .get(names::TOP_SOURCE_CHAINS, &stale_params)
            .await
            .is_none());

        let fresh = session.render(Page::ChainActivity).await.unwrap();
        assert_eq!(fresh.range, range(15));
        assert_eq!(fresh.reports.len(), 2);
    }

    #[tokio::test]
    async fn test_range_change_leaves_other_sessions_rendering() {
        let service = service();
        let moved = DashboardSession::new(service.clone(), range(31));
        let unchanged = DashboardSession::new(service.clone(), range(31));

        let (stale, current, _) = tokio::join!(
            moved.render(Page::ChainActivity),
            unchanged.render(Page::ChainActivity),
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                moved.set_range(range(15)).await;
            }
        );

        assert!(matches!(stale.unwrap_err(), AnalyticsError::Cancelled(_)));
        let current = current.unwrap();
        assert_eq!(current.range, range(31));
        assert_eq!(current.reports.len(), 2);

        let params = ReportParams::for_range(&range(31));
        assert!(service
            .cache()
            .get(names::TOP_SOURCE_CHAINS, &params)
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_same_range_keeps_token() {
        let session = session();
        let before = session.state.read().await.token.clone();

        session.set_range(range(31)).await;
        assert!(!before.is_cancelled());

        session.set_range(range(10)).await;
        assert!(before.is_cancelled());
        assert_eq!(session.range().await, range(10));
    }
}
