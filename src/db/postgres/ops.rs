use std::error::Error;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, error};
use postgres_types::{ToSql, Type};
use tokio_postgres::Row;

use crate::db::postgres::PostgresWarehouse;
use crate::db::{Column, SemanticType, TabularResult, Value, WarehouseClient};
use crate::error::{AnalyticsError, Result};
use crate::report::{BindValue, Statement};

fn query_error(report: &str, message: String, transient: bool) -> AnalyticsError {
    AnalyticsError::QueryExecution {
        report: report.to_string(),
        message,
        transient,
    }
}

/// Only a closed connection or an I/O failure may succeed on retry. Server
/// errors (SQLSTATE) and client-side bind or type errors fail again.
fn classify(report: &str, e: tokio_postgres::Error) -> AnalyticsError {
    let transient = e.is_closed() || is_io_failure(e.source());
    query_error(report, e.to_string(), transient)
}

fn is_io_failure(source: Option<&(dyn Error + 'static)>) -> bool {
    source.is_some_and(|source| source.is::<std::io::Error>())
}

fn semantic_for(ty: &Type) -> SemanticType {
    match ty {
        t if *t == Type::INT8 || *t == Type::INT4 || *t == Type::INT2 => SemanticType::Integer,
        t if *t == Type::FLOAT8 || *t == Type::FLOAT4 => SemanticType::Decimal,
        t if *t == Type::DATE => SemanticType::Date,
        _ => SemanticType::Text,
    }
}

fn cell(row: &Row, index: usize, ty: &Type) -> std::result::Result<Value, String> {
    let get_err = |e: tokio_postgres::Error| e.to_string();

    let value = match ty {
        t if *t == Type::INT8 => row
            .try_get::<_, Option<i64>>(index)
            .map_err(get_err)?
            .map(Value::Int),
        t if *t == Type::INT4 => row
            .try_get::<_, Option<i32>>(index)
            .map_err(get_err)?
            .map(|v| Value::Int(v as i64)),
        t if *t == Type::INT2 => row
            .try_get::<_, Option<i16>>(index)
            .map_err(get_err)?
            .map(|v| Value::Int(v as i64)),
        t if *t == Type::FLOAT8 => row
            .try_get::<_, Option<f64>>(index)
            .map_err(get_err)?
            .map(Value::Float),
        t if *t == Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(index)
            .map_err(get_err)?
            .map(|v| Value::Float(v as f64)),
        t if *t == Type::TEXT || *t == Type::VARCHAR || *t == Type::BPCHAR || *t == Type::NAME => {
            row.try_get::<_, Option<String>>(index)
                .map_err(get_err)?
                .map(Value::Text)
        },
        t if *t == Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(index)
            .map_err(get_err)?
            .map(Value::Date),
        t if *t == Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(index)
            .map_err(get_err)?
            .map(|v| Value::Text(v.format("%Y-%m-%d %H:%M:%S").to_string())),
        other => return Err(format!("unsupported column type {}", other.name())),
    };

    Ok(value.unwrap_or(Value::Null))
}

/// Convert driver rows into a [`TabularResult`], taking column names and
/// order from the statement's result description.
fn rows_to_tabular(report: &str, rows: &[Row]) -> Result<TabularResult> {
    let Some(first) = rows.first() else {
        return Ok(TabularResult::default());
    };

    let columns: Vec<Column> = first
        .columns()
        .iter()
        .map(|c| Column {
            name: c.name().to_string(),
            semantic: semantic_for(c.type_()),
        })
        .collect();

    let mut result = TabularResult::new(columns);
    for row in rows {
        let mut cells = Vec::with_capacity(row.len());
        for (index, column) in row.columns().iter().enumerate() {
            let value = cell(row, index, column.type_())
                .map_err(|message| query_error(report, message, false))?;
            cells.push(value);
        }
        result.push_row(cells);
    }

    Ok(result)
}

#[async_trait]
impl WarehouseClient for PostgresWarehouse {
    async fn execute(&self, statement: &Statement) -> Result<TabularResult> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| query_error(&statement.report, e.to_string(), true))?;

        let params: Vec<&(dyn ToSql + Sync)> = statement
            .binds
            .iter()
            .map(|bind| match bind {
                BindValue::Date(date) => date as &(dyn ToSql + Sync),
                BindValue::Text(text) => text as &(dyn ToSql + Sync),
            })
            .collect();

        let start = Instant::now();
        let result = client.query(statement.sql.as_str(), &params).await;
        let duration_ms = start.elapsed().as_millis();

        match result {
            Ok(rows) => {
                debug!(
                    "[{}] Query executed in {}ms ({} rows)",
                    statement.report,
                    duration_ms,
                    rows.len()
                );
                // A statement with no rows still has a column description,
                // which the driver only exposes on rows; fall back to prepare.
                if rows.is_empty() {
                    let prepared = client
                        .prepare(statement.sql.as_str())
                        .await
                        .map_err(|e| classify(&statement.report, e))?;
                    let columns = prepared
                        .columns()
                        .iter()
                        .map(|c| Column {
                            name: c.name().to_string(),
                            semantic: semantic_for(c.type_()),
                        })
                        .collect();
                    return Ok(TabularResult::new(columns));
                }
                rows_to_tabular(&statement.report, &rows)
            },
            Err(e) => {
                error!(
                    "[{}] Query failed after {}ms: {}",
                    statement.report, duration_ms, e
                );
                Err(classify(&statement.report, e))
            },
        }
    }

    async fn health_check(&self) -> Result<()> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| query_error("health_check", e.to_string(), true))?;
        client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| classify("health_check", e))?;
        Ok(())
    }
}
