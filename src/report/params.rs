use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;

use crate::error::{AnalyticsError, Result};
use crate::report::{DateRange, TimeBucket};

/// Name of a report parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamName {
    StartDate,
    EndDate,
    Granularity,
}

impl ParamName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StartDate => "start_date",
            Self::EndDate => "end_date",
            Self::Granularity => "granularity",
        }
    }
}

impl fmt::Display for ParamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamValue {
    Date(NaiveDate),
    Granularity(TimeBucket),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            Self::Granularity(bucket) => write!(f, "{}", bucket),
        }
    }
}

/// Bound parameters of one report invocation.
///
/// Backed by an ordered map so two parameter sets with the same content
/// always serialize to the same cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ReportParams {
    values: BTreeMap<ParamName, ParamValue>,
}

impl ReportParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_range(range: &DateRange) -> Self {
        let mut params = Self::new();
        params.set(ParamName::StartDate, ParamValue::Date(range.start()));
        params.set(ParamName::EndDate, ParamValue::Date(range.end()));
        params
    }

    pub fn with_granularity(mut self, bucket: TimeBucket) -> Self {
        self.set(ParamName::Granularity, ParamValue::Granularity(bucket));
        self
    }

    pub fn set(&mut self, name: ParamName, value: ParamValue) {
        self.values.insert(name, value);
    }

    pub fn get(&self, name: ParamName) -> Option<&ParamValue> {
        self.values.get(&name)
    }

    pub fn contains(&self, name: ParamName) -> bool {
        self.values.contains_key(&name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParamName, &ParamValue)> {
        self.values.iter()
    }

    /// Date-valued parameter, failing when absent or of another kind.
    pub fn date(&self, report: &str, name: ParamName) -> Result<NaiveDate> {
        match self.values.get(&name) {
            Some(ParamValue::Date(date)) => Ok(*date),
            Some(_) => Err(AnalyticsError::InvalidParameter {
                report: report.to_string(),
                param: name,
            }),
            None => Err(AnalyticsError::MissingParameter {
                report: report.to_string(),
                param: name,
            }),
        }
    }

    /// Granularity parameter if present.
    pub fn granularity(&self, report: &str) -> Result<Option<TimeBucket>> {
        match self.values.get(&ParamName::Granularity) {
            Some(ParamValue::Granularity(bucket)) => Ok(Some(*bucket)),
            Some(_) => Err(AnalyticsError::InvalidParameter {
                report: report.to_string(),
                param: ParamName::Granularity,
            }),
            None => Ok(None),
        }
    }

    /// Canonical `name=value&...` serialization in parameter order.
    pub fn cache_key(&self) -> String {
        self.values
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("&")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_cache_key_is_insertion_order_independent() {
        let mut a = ReportParams::new();
        a.set(ParamName::EndDate, ParamValue::Date(date(2022, 1, 31)));
        a.set(ParamName::StartDate, ParamValue::Date(date(2022, 1, 1)));

        let range = DateRange::new(date(2022, 1, 1), date(2022, 1, 31)).unwrap();
        let b = ReportParams::for_range(&range);

        assert_eq!(a, b);
        assert_eq!(a.cache_key(), "start_date=2022-01-01&end_date=2022-01-31");
    }

    #[test]
    fn test_granularity_is_part_of_key() {
        let range = DateRange::new(date(2022, 1, 1), date(2022, 1, 31)).unwrap();
        let params = ReportParams::for_range(&range).with_granularity(TimeBucket::Month);
        assert_eq!(
            params.cache_key(),
            "start_date=2022-01-01&end_date=2022-01-31&granularity=month"
        );
    }

    #[test]
    fn test_missing_and_mistyped_dates() {
        let mut params = ReportParams::new();
        assert_eq!(
            params.date("swap_totals", ParamName::StartDate),
            Err(AnalyticsError::MissingParameter {
                report: "swap_totals".to_string(),
                param: ParamName::StartDate,
            })
        );

        params.set(
            ParamName::StartDate,
            ParamValue::Granularity(TimeBucket::Week),
        );
        assert_eq!(
            params.date("swap_totals", ParamName::StartDate),
            Err(AnalyticsError::InvalidParameter {
                report: "swap_totals".to_string(),
                param: ParamName::StartDate,
            })
        );
    }

    #[test]
    fn test_empty_params_have_empty_key() {
        assert_eq!(ReportParams::new().cache_key(), "");
        assert!(ReportParams::new().is_empty());
    }
}
