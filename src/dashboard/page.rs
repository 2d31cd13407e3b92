use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use futures::future::try_join_all;
use log::info;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::config::DashboardSettings;
use crate::db::TabularResult;
use crate::error::Result;
use crate::report::{names, DateRange, ReportParams};
use crate::service::ReportService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Page {
    Overview,
    ChainActivity,
    RouteActivity,
}

impl Page {
    pub const ALL: [Page; 3] = [Self::Overview, Self::ChainActivity, Self::RouteActivity];

    pub fn slug(&self) -> &'static str {
        match self {
            Self::Overview => "overview",
            Self::ChainActivity => "chain_activity",
            Self::RouteActivity => "route_activity",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::Overview => "Overview",
            Self::ChainActivity => "Source and destination chains",
            Self::RouteActivity => "Routes",
        }
    }

    /// Reports shown on the page, in display order.
    pub fn reports(&self) -> &'static [&'static str] {
        match self {
            Self::Overview => &[
                names::SWAP_TOTALS,
                names::SWAP_TOTALS_LAST_24H,
                names::BLOCK_TOTALS,
                names::BLOCK_TOTALS_LAST_24H,
                names::SWAP_ACTIVITY,
                names::NEW_SWAPPERS,
                names::SWAPPER_DISTRIBUTION,
                names::TOP_SWAPPERS,
            ],
            Self::ChainActivity => &[names::TOP_SOURCE_CHAINS, names::TOP_DESTINATION_CHAINS],
            Self::RouteActivity => &[
                names::PATH_ACTIVITY,
                names::TOP_PATHS_BY_SWAPPERS,
                names::TOP_PATHS_BY_SWAPS,
                names::PATH_SWAP_SHARE,
            ],
        }
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

#[derive(Debug, Clone)]
pub struct PageReport {
    pub report: &'static str,
    pub result: Arc<TabularResult>,
}

/// Results of every report on a page, in page order.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub page: Page,
    pub range: DateRange,
    pub reports: Vec<PageReport>,
}

impl RenderedPage {
    pub fn get(&self, report: &str) -> Option<&TabularResult> {
        self.reports
            .iter()
            .find(|r| r.report == report)
            .map(|r| r.result.as_ref())
    }

    pub fn to_json(&self) -> serde_json::Value {
        let reports: Vec<serde_json::Value> = self
            .reports
            .iter()
            .map(|r| {
                let mut value = r.result.to_json();
                value["report"] = json!(r.report);
                value
            })
            .collect();

        json!({
            "page": self.page.slug(),
            "title": self.page.title(),
            "range": self.range,
            "reports": reports,
        })
    }
}

/// The configured default range, ending today (UTC) unless an end date is set.
pub fn default_range(settings: &DashboardSettings) -> Result<DateRange> {
    let end = settings
        .default_end_date
        .unwrap_or_else(|| Utc::now().date_naive());
    DateRange::new(settings.default_start_date, end)
}

/// Run all reports of `page` for `range` concurrently. The first failure
/// fails the page.
pub async fn render_page(
    service: &ReportService,
    page: Page,
    range: &DateRange,
    token: &CancellationToken,
) -> Result<RenderedPage> {
    let params = ReportParams::for_range(range);
    let start = std::time::Instant::now();

    let results = try_join_all(
        page.reports()
            .iter()
            .map(|report| service.run_cancellable(report, &params, token)),
    )
    .await?;

    info!(
        "Rendered page {} ({} reports) in {:?}",
        page,
        results.len(),
        start.elapsed()
    );

    Ok(RenderedPage {
        page,
        range: *range,
        reports: page
            .reports()
            .iter()
            .copied()
            .zip(results)
            .map(|(report, result)| PageReport {
                report,
                result,
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::config::{CacheSettings, RetrySettings};
    use crate::cache::ResultCache;
    use crate::db::models::{BlockRecord, SwapRecord};
    use crate::db::{InMemoryWarehouse, Value};
    use crate::report::{QueryBuilder, ReportCatalog};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn service() -> ReportService {
        let at = |d: u32| date(2022, 1, d).and_hms_opt(12, 0, 0).unwrap();
        let warehouse = InMemoryWarehouse::new(
            vec![
                SwapRecord::new(at(3), "0x1", "A", "ethereum", "polygon", "USDC"),
                SwapRecord::new(at(4), "0x2", "A", "ethereum", "polygon", "USDC"),
                SwapRecord::new(at(10), "0x3", "B", "avalanche", "base", "WETH"),
            ],
            vec![BlockRecord::new(1, at(3), 12), BlockRecord::new(2, at(4), 8)],
        );
        ReportService::new(
            Arc::new(warehouse),
            QueryBuilder::default(),
            ResultCache::new(&CacheSettings::default()),
            RetrySettings::default(),
        )
    }

    #[test]
    fn test_every_catalog_report_is_on_a_page() {
        let mut on_pages: Vec<_> = Page::ALL.iter().flat_map(|p| p.reports()).copied().collect();
        on_pages.sort_unstable();
        let catalog: Vec<_> = ReportCatalog::global().names().collect();
        assert_eq!(on_pages, catalog);
    }

    #[test]
    fn test_default_range() {
        let settings = DashboardSettings {
            default_start_date: date(2022, 1, 1),
            default_end_date: Some(date(2022, 6, 30)),
        };
        let range = default_range(&settings).unwrap();
        assert_eq!(range.end(), date(2022, 6, 30));

        let inverted = DashboardSettings {
            default_start_date: date(2023, 1, 1),
            default_end_date: Some(date(2022, 6, 30)),
        };
        assert!(default_range(&inverted).is_err());
    }

    #[tokio::test]
    async fn test_render_keeps_page_order() {
        let service = service();
        let range = DateRange::new(date(2022, 1, 1), date(2022, 1, 31)).unwrap();

        let rendered = render_page(&service, Page::Overview, &range, &CancellationToken::new())
            .await
            .unwrap();

        let order: Vec<_> = rendered.reports.iter().map(|r| r.report).collect();
        assert_eq!(order, Page::Overview.reports().to_vec());

        let blocks = rendered.get(names::BLOCK_TOTALS).unwrap();
        assert_eq!(blocks.value(0, "blocks_count"), Some(&Value::Int(2)));
        assert_eq!(blocks.value(0, "avg_tx_per_block"), Some(&Value::Int(10)));
    }

    #[tokio::test]
    async fn test_page_json() {
        let service = service();
        let range = DateRange::new(date(2022, 1, 1), date(2022, 1, 31)).unwrap();

        let rendered = render_page(&service, Page::ChainActivity, &range, &CancellationToken::new())
            .await
            .unwrap();
        let json = rendered.to_json();

        assert_eq!(json["page"], "chain_activity");
        assert_eq!(json["range"]["start"], "2022-01-01");
        assert_eq!(json["reports"][0]["report"], names::TOP_SOURCE_CHAINS);
        assert_eq!(json["reports"][0]["rows"][0]["chain"], "avalanche");
    }
}
