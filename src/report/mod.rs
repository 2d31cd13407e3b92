//! Report definitions and SQL generation.
//!
//! - [`date_range`] - validated inclusive date window
//! - [`params`] - report parameters and their canonical cache key
//! - [`shape`] - aggregation vocabulary
//! - [`catalog`] - the static set of named reports
//! - [`builder`] - report + parameters to parameterized SQL

pub mod builder;
pub mod catalog;
mod date_range;
mod params;
mod shape;

pub use builder::{BindValue, QueryBuilder, QueryPlan, ResolvedWindow, Statement};
pub use catalog::{names, ReportCatalog, ReportSpec};
pub use date_range::DateRange;
pub use params::{ParamName, ParamValue, ReportParams};
pub use shape::{
    ActivityBand, AggregationShape, Dimension, RankMetric, TimeBucket, Window, TOP_N,
};
