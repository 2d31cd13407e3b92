use chrono::NaiveDate;
use thiserror::Error;

use crate::report::ParamName;

/// Failures surfaced by the reporting pipeline.
///
/// `Clone` so a single failed computation can be handed to every caller
/// waiting on the same cache key.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyticsError {
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("Unknown report '{0}'")]
    UnknownReport(String),

    #[error("Report '{report}' is missing required parameter '{param}'")]
    MissingParameter { report: String, param: ParamName },

    #[error("Report '{report}' got an invalid value for parameter '{param}'")]
    InvalidParameter { report: String, param: ParamName },

    #[error("Query for report '{report}' failed: {message}")]
    QueryExecution {
        report: String,
        message: String,
        /// Connectivity-class failure that may succeed on retry
        transient: bool,
    },

    #[error("Report '{report}' returned columns {actual:?}, expected {expected:?}")]
    SchemaMismatch {
        report: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("Computation of report '{0}' was cancelled")]
    Cancelled(String),
}

impl AnalyticsError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::QueryExecution { transient: true, .. })
    }
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;
