use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{AnalyticsError, Result};

/// Presentation-level meaning of a result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Date,
    Text,
    /// Non-negative distinct count
    Count,
    /// Rounded integer metric, nullable
    Integer,
    Decimal,
}

/// Declared column of a report's output contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub semantic: SemanticType,
}

impl ColumnSpec {
    pub const fn new(name: &'static str, semantic: SemanticType) -> Self {
        Self { name, semantic }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    pub semantic: SemanticType,
}

impl From<&ColumnSpec> for Column {
    fn from(spec: &ColumnSpec) -> Self {
        Self {
            name: spec.name.to_string(),
            semantic: spec.semantic,
        }
    }
}

/// A single cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<Option<i64>> for Value {
    fn from(v: Option<i64>) -> Self {
        v.map(Self::Int).unwrap_or(Self::Null)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

/// Ordered columns plus rows of cells in column order.
///
/// Zero rows is a valid, distinct outcome from a failed query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabularResult {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl TabularResult {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn from_specs(specs: &[ColumnSpec]) -> Self {
        Self::new(specs.iter().map(Column::from).collect())
    }

    /// Append a row; cells must follow column order.
    pub fn push_row(&mut self, row: Vec<Value>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)
    }

    /// All cells of one column, top to bottom.
    pub fn column_values(&self, column: &str) -> Vec<&Value> {
        match self.column_index(column) {
            Some(index) => self.rows.iter().filter_map(|row| row.get(index)).collect(),
            None => Vec::new(),
        }
    }

    /// Check the result against a report's column contract and adopt its
    /// semantic types. Names must match exactly and in order.
    pub fn conform(mut self, report: &str, specs: &[ColumnSpec]) -> Result<Self> {
        let matches = self.columns.len() == specs.len()
            && self
                .columns
                .iter()
                .zip(specs)
                .all(|(column, spec)| column.name == spec.name);

        if !matches {
            return Err(AnalyticsError::SchemaMismatch {
                report: report.to_string(),
                expected: specs.iter().map(|s| s.name.to_string()).collect(),
                actual: self.column_names(),
            });
        }

        for (column, spec) in self.columns.iter_mut().zip(specs) {
            column.semantic = spec.semantic;
        }
        Ok(self)
    }

    /// `{"columns": [...], "rows": [{name: value, ...}, ...]}`
    pub fn to_json(&self) -> serde_json::Value {
        let rows: Vec<serde_json::Value> = self
            .rows
            .iter()
            .map(|row| {
                let object: serde_json::Map<String, serde_json::Value> = self
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(column, value)| {
                        (
                            column.name.clone(),
                            serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
                        )
                    })
                    .collect();
                serde_json::Value::Object(object)
            })
            .collect();

        serde_json::json!({
            "columns": self.columns,
            "rows": rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TabularResult {
        let mut result = TabularResult::from_specs(&[
            ColumnSpec::new("path", SemanticType::Text),
            ColumnSpec::new("swap_count", SemanticType::Count),
        ]);
        result.push_row(vec!["ethereum⟂polygon".into(), Value::Int(5)]);
        result.push_row(vec!["avalanche⟂base".into(), Value::Null]);
        result
    }

    #[test]
    fn test_value_lookup_by_name() {
        let result = sample();
        assert_eq!(result.len(), 2);
        assert_eq!(result.value(0, "swap_count"), Some(&Value::Int(5)));
        assert_eq!(result.value(1, "path").and_then(Value::as_str), Some("avalanche⟂base"));
        assert!(result.value(0, "missing").is_none());
        assert!(result.value(5, "path").is_none());
    }

    #[test]
    fn test_conform_accepts_matching_names() {
        let mut raw = TabularResult::new(vec![
            Column {
                name: "path".to_string(),
                semantic: SemanticType::Text,
            },
            Column {
                name: "swap_count".to_string(),
                semantic: SemanticType::Integer,
            },
        ]);
        raw.push_row(vec!["a⟂b".into(), Value::Int(1)]);

        let conformed = raw
            .conform(
                "top_paths_by_swaps",
                &[
                    ColumnSpec::new("path", SemanticType::Text),
                    ColumnSpec::new("swap_count", SemanticType::Count),
                ],
            )
            .unwrap();
        assert_eq!(conformed.columns()[1].semantic, SemanticType::Count);
    }

    #[test]
    fn test_conform_rejects_renamed_column() {
        let err = sample()
            .conform(
                "top_paths_by_swaps",
                &[
                    ColumnSpec::new("Path", SemanticType::Text),
                    ColumnSpec::new("swap_count", SemanticType::Count),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_json_rows_are_keyed_by_column() {
        let json = sample().to_json();
        assert_eq!(json["rows"][0]["path"], "ethereum⟂polygon");
        assert_eq!(json["rows"][0]["swap_count"], 5);
        assert!(json["rows"][1]["swap_count"].is_null());
        assert_eq!(json["columns"][1]["semantic"], "count");
    }

    #[test]
    fn test_empty_result_is_not_an_error() {
        let result = TabularResult::from_specs(&[ColumnSpec::new("band", SemanticType::Text)]);
        assert!(result.is_empty());
        assert!(result.column_values("band").is_empty());
    }
}
