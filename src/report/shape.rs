//! Aggregation vocabulary shared by the query builder and the warehouses.
//!
//! Every report is one [`AggregationShape`] evaluated over a [`Window`] of
//! the swap (or block) fact table. Path decomposition is not a shape of its
//! own: it is [`Dimension::Path`] plugged into a bucketed, ranked or share
//! shape.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::db::{ColumnSpec, SemanticType};

/// Ranked reports are truncated to this many rows.
pub const TOP_N: usize = 10;

/// Time truncation unit for bucketed reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeBucket {
    Day,
    Week,
    Month,
}

impl TimeBucket {
    /// Unit name understood by `DATE_TRUNC`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }

    /// Start of the bucket containing `date`. Weeks start on Monday.
    pub fn truncate(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Self::Day => date,
            Self::Week => date - Duration::days(date.weekday().num_days_from_monday() as i64),
            Self::Month => date.with_day(1).unwrap_or(date),
        }
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeBucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            other => Err(format!("unknown time bucket '{}'", other)),
        }
    }
}

/// Grouping dimension of a swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    SourceChain,
    DestinationChain,
    /// `source_chain <separator> destination_chain`
    Path,
}

impl Dimension {
    /// Output column carrying the dimension value.
    pub fn column_name(&self) -> &'static str {
        match self {
            Self::SourceChain | Self::DestinationChain => "chain",
            Self::Path => "path",
        }
    }
}

/// Metric a ranked report is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RankMetric {
    Swaps,
    Swappers,
}

impl RankMetric {
    pub fn column_name(&self) -> &'static str {
        match self {
            Self::Swaps => "swap_count",
            Self::Swappers => "swapper_count",
        }
    }
}

/// Time window a report filters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Window {
    /// The user-selected inclusive date range
    Selected,
    /// `date >= current_date - 1`, independent of any selection
    Last24Hours,
}

/// Activity-count classification band of a swapper.
///
/// Bands are upper-inclusive and together cover every count >= 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActivityBand {
    One,
    UpToFive,
    UpToTen,
    UpToTwenty,
    UpToFifty,
    OverFifty,
}

impl ActivityBand {
    pub const ALL: [ActivityBand; 6] = [
        Self::One,
        Self::UpToFive,
        Self::UpToTen,
        Self::UpToTwenty,
        Self::UpToFifty,
        Self::OverFifty,
    ];

    pub fn classify(swap_count: u64) -> Self {
        match swap_count {
            0..=1 => Self::One,
            2..=5 => Self::UpToFive,
            6..=10 => Self::UpToTen,
            11..=20 => Self::UpToTwenty,
            21..=50 => Self::UpToFifty,
            _ => Self::OverFifty,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::One => "=1",
            Self::UpToFive => "(1-5]",
            Self::UpToTen => "(5-10]",
            Self::UpToTwenty => "(10-20]",
            Self::UpToFifty => "(20-50]",
            Self::OverFifty => ">50",
        }
    }

    /// Inclusive upper bound, `None` for the catch-all band.
    pub fn upper_bound(&self) -> Option<u64> {
        match self {
            Self::One => Some(1),
            Self::UpToFive => Some(5),
            Self::UpToTen => Some(10),
            Self::UpToTwenty => Some(20),
            Self::UpToFifty => Some(50),
            Self::OverFifty => None,
        }
    }
}

/// The fixed set of aggregation shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationShape {
    /// Distinct swaps, distinct swappers and their rounded ratio
    Totals,
    /// Distinct blocks and rounded average transactions per block
    BlockTotals,
    /// Distinct swaps/swappers per time bucket, optionally split by a dimension
    TimeBucketedCount { dimension: Option<Dimension> },
    /// New swappers per bucket of first appearance, with running total
    FirstSeenCumulative,
    /// Top [`TOP_N`] dimension values by a ranking metric
    TopNByDimension {
        dimension: Dimension,
        rank_by: RankMetric,
    },
    /// Distinct swappers per [`ActivityBand`]
    BucketedDistribution,
    /// Swaps per (bucket, dimension) with the dimension's share of the bucket
    ShareOfBucket { dimension: Dimension },
    /// Top [`TOP_N`] swappers with several distinct-count metrics
    TopEntitiesMultiMetric,
}

impl AggregationShape {
    pub fn is_time_bucketed(&self) -> bool {
        matches!(
            self,
            Self::TimeBucketedCount { .. } | Self::FirstSeenCumulative | Self::ShareOfBucket { .. }
        )
    }

    pub fn row_limit(&self) -> Option<usize> {
        match self {
            Self::TopNByDimension { .. } | Self::TopEntitiesMultiMetric => Some(TOP_N),
            _ => None,
        }
    }

    /// Column contract of the shape's result set, in output order.
    pub fn output_columns(&self) -> Vec<ColumnSpec> {
        use SemanticType::*;

        let mut columns = Vec::new();
        match self {
            Self::Totals => {
                columns.push(ColumnSpec::new("total_swaps", Count));
                columns.push(ColumnSpec::new("total_swapper", Count));
                columns.push(ColumnSpec::new("avg_number_swaped_per_user", Integer));
            },
            Self::BlockTotals => {
                columns.push(ColumnSpec::new("blocks_count", Count));
                columns.push(ColumnSpec::new("avg_tx_per_block", Integer));
            },
            Self::TimeBucketedCount { dimension } => {
                columns.push(ColumnSpec::new("bucket", Date));
                if let Some(dimension) = dimension {
                    columns.push(ColumnSpec::new(dimension.column_name(), Text));
                }
                columns.push(ColumnSpec::new("swap_count", Count));
                columns.push(ColumnSpec::new("swapper_count", Count));
                columns.push(ColumnSpec::new("avg_swaps_per_swapper", Integer));
            },
            Self::FirstSeenCumulative => {
                columns.push(ColumnSpec::new("bucket", Date));
                columns.push(ColumnSpec::new("new_swappers", Count));
                columns.push(ColumnSpec::new("cumulative_swappers", Count));
            },
            Self::TopNByDimension { dimension, .. } => {
                columns.push(ColumnSpec::new(dimension.column_name(), Text));
                columns.push(ColumnSpec::new("swap_count", Count));
                columns.push(ColumnSpec::new("swapper_count", Count));
                columns.push(ColumnSpec::new("avg_swaps_per_swapper", Integer));
            },
            Self::BucketedDistribution => {
                columns.push(ColumnSpec::new("band", Text));
                columns.push(ColumnSpec::new("swapper_count", Count));
            },
            Self::ShareOfBucket { dimension } => {
                columns.push(ColumnSpec::new("bucket", Date));
                columns.push(ColumnSpec::new(dimension.column_name(), Text));
                columns.push(ColumnSpec::new("swap_count", Count));
                columns.push(ColumnSpec::new("share_pct", Decimal));
            },
            Self::TopEntitiesMultiMetric => {
                columns.push(ColumnSpec::new("swapper", Text));
                columns.push(ColumnSpec::new("swap_count", Count));
                columns.push(ColumnSpec::new("path_count", Count));
                columns.push(ColumnSpec::new("source_chain_count", Count));
                columns.push(ColumnSpec::new("destination_chain_count", Count));
                columns.push(ColumnSpec::new("token_count", Count));
                columns.push(ColumnSpec::new("active_days", Count));
            },
        }
        columns
    }
}
