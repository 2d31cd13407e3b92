//! Static catalog of named reports.
//!
//! Built once on first use and never mutated afterwards, so it is shared
//! across tasks without locking.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;

use crate::db::ColumnSpec;
use crate::error::{AnalyticsError, Result};
use crate::report::{
    AggregationShape, DateRange, Dimension, ParamName, ParamValue, RankMetric, ReportParams,
    TimeBucket, Window,
};

/// Report names exposed to callers.
pub mod names {
    pub const SWAP_TOTALS: &str = "swap_totals";
    pub const SWAP_TOTALS_LAST_24H: &str = "swap_totals_last_24h";
    pub const BLOCK_TOTALS: &str = "block_totals";
    pub const BLOCK_TOTALS_LAST_24H: &str = "block_totals_last_24h";
    pub const SWAP_ACTIVITY: &str = "swap_activity";
    pub const NEW_SWAPPERS: &str = "new_swappers";
    pub const TOP_SOURCE_CHAINS: &str = "top_source_chains";
    pub const TOP_DESTINATION_CHAINS: &str = "top_destination_chains";
    pub const SWAPPER_DISTRIBUTION: &str = "swapper_distribution";
    pub const PATH_ACTIVITY: &str = "path_activity";
    pub const TOP_PATHS_BY_SWAPPERS: &str = "top_paths_by_swappers";
    pub const TOP_PATHS_BY_SWAPS: &str = "top_paths_by_swaps";
    pub const PATH_SWAP_SHARE: &str = "path_swap_share";
    pub const TOP_SWAPPERS: &str = "top_swappers";
}

const RANGE_PARAMS: &[ParamName] = &[ParamName::StartDate, ParamName::EndDate];
const GRANULARITY_PARAM: &[ParamName] = &[ParamName::Granularity];

/// Declaration of one named report.
#[derive(Debug, Clone)]
pub struct ReportSpec {
    pub name: &'static str,
    pub title: &'static str,
    pub shape: AggregationShape,
    pub window: Window,
    pub default_granularity: Option<TimeBucket>,
    pub required_params: &'static [ParamName],
    pub optional_params: &'static [ParamName],
    pub output_columns: Vec<ColumnSpec>,
}

impl ReportSpec {
    fn ranged(name: &'static str, title: &'static str, shape: AggregationShape) -> Self {
        Self {
            name,
            title,
            shape,
            window: Window::Selected,
            default_granularity: None,
            required_params: RANGE_PARAMS,
            optional_params: &[],
            output_columns: shape.output_columns(),
        }
    }

    fn rolling(name: &'static str, title: &'static str, shape: AggregationShape) -> Self {
        Self {
            name,
            title,
            shape,
            window: Window::Last24Hours,
            default_granularity: None,
            required_params: &[],
            optional_params: &[],
            output_columns: shape.output_columns(),
        }
    }

    fn bucketed(mut self, default: TimeBucket) -> Self {
        self.default_granularity = Some(default);
        self.optional_params = GRANULARITY_PARAM;
        self
    }

    pub fn is_rolling(&self) -> bool {
        self.window == Window::Last24Hours
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.output_columns.iter().map(|c| c.name).collect()
    }

    /// Validate `params` against this report and reduce them to the exact set
    /// that identifies a result: required parameters, plus the resolved
    /// granularity for bucketed reports. Undeclared parameters are dropped.
    pub fn normalize(&self, params: &ReportParams) -> Result<ReportParams> {
        let mut normalized = ReportParams::new();

        for &name in self.required_params {
            let value = params.get(name).ok_or_else(|| AnalyticsError::MissingParameter {
                report: self.name.to_string(),
                param: name,
            })?;
            normalized.set(name, *value);
        }

        if self.window == Window::Selected {
            let start = normalized.date(self.name, ParamName::StartDate)?;
            let end = normalized.date(self.name, ParamName::EndDate)?;
            DateRange::new(start, end)?;
        }

        if let Some(default) = self.default_granularity {
            let bucket = params.granularity(self.name)?.unwrap_or(default);
            normalized.set(ParamName::Granularity, ParamValue::Granularity(bucket));
        }

        Ok(normalized)
    }
}

/// Name-indexed set of report declarations.
#[derive(Debug)]
pub struct ReportCatalog {
    reports: BTreeMap<&'static str, ReportSpec>,
}

static CATALOG: Lazy<ReportCatalog> = Lazy::new(ReportCatalog::standard);

impl ReportCatalog {
    pub fn global() -> &'static ReportCatalog {
        &CATALOG
    }

    fn standard() -> Self {
        use names::*;

        let path_bucketed = AggregationShape::TimeBucketedCount {
            dimension: Some(Dimension::Path),
        };

        let specs = vec![
            ReportSpec::ranged(SWAP_TOTALS, "Swap totals", AggregationShape::Totals),
            ReportSpec::rolling(
                SWAP_TOTALS_LAST_24H,
                "Swap totals (last 24h)",
                AggregationShape::Totals,
            ),
            ReportSpec::ranged(BLOCK_TOTALS, "Block totals", AggregationShape::BlockTotals),
            ReportSpec::rolling(
                BLOCK_TOTALS_LAST_24H,
                "Block totals (last 24h)",
                AggregationShape::BlockTotals,
            ),
            ReportSpec::ranged(
                SWAP_ACTIVITY,
                "Swaps and swappers over time",
                AggregationShape::TimeBucketedCount { dimension: None },
            )
            .bucketed(TimeBucket::Week),
            ReportSpec::ranged(
                NEW_SWAPPERS,
                "New swappers over time",
                AggregationShape::FirstSeenCumulative,
            )
            .bucketed(TimeBucket::Week),
            ReportSpec::ranged(
                TOP_SOURCE_CHAINS,
                "Top source chains by swappers",
                AggregationShape::TopNByDimension {
                    dimension: Dimension::SourceChain,
                    rank_by: RankMetric::Swappers,
                },
            ),
            ReportSpec::ranged(
                TOP_DESTINATION_CHAINS,
                "Top destination chains by swappers",
                AggregationShape::TopNByDimension {
                    dimension: Dimension::DestinationChain,
                    rank_by: RankMetric::Swappers,
                },
            ),
            ReportSpec::ranged(
                SWAPPER_DISTRIBUTION,
                "Swappers by number of swaps",
                AggregationShape::BucketedDistribution,
            ),
            ReportSpec::ranged(PATH_ACTIVITY, "Activity by path", path_bucketed)
                .bucketed(TimeBucket::Month),
            ReportSpec::ranged(
                TOP_PATHS_BY_SWAPPERS,
                "Top paths by swappers",
                AggregationShape::TopNByDimension {
                    dimension: Dimension::Path,
                    rank_by: RankMetric::Swappers,
                },
            ),
            ReportSpec::ranged(
                TOP_PATHS_BY_SWAPS,
                "Top paths by swaps",
                AggregationShape::TopNByDimension {
                    dimension: Dimension::Path,
                    rank_by: RankMetric::Swaps,
                },
            ),
            ReportSpec::ranged(
                PATH_SWAP_SHARE,
                "Share of swaps by path",
                AggregationShape::ShareOfBucket {
                    dimension: Dimension::Path,
                },
            )
            .bucketed(TimeBucket::Month),
            ReportSpec::ranged(
                TOP_SWAPPERS,
                "Top swappers",
                AggregationShape::TopEntitiesMultiMetric,
            ),
        ];

        Self {
            reports: specs.into_iter().map(|spec| (spec.name, spec)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Result<&ReportSpec> {
        self.reports
            .get(name)
            .ok_or_else(|| AnalyticsError::UnknownReport(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.reports.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReportSpec> {
        self.reports.values()
    }

    pub fn rolling(&self) -> impl Iterator<Item = &ReportSpec> {
        self.reports.values().filter(|spec| spec.is_rolling())
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}
