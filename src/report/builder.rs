//! SQL rendering for catalog reports.
//!
//! Dates and the path separator are never interpolated: they travel as bind
//! values (`$1`, `$2`, ...) next to the statement text. Only identifiers from
//! configuration and fixed vocabulary (truncation units, band labels) are
//! written into the SQL itself.

use chrono::NaiveDate;

use crate::config::WarehouseSettings;
use crate::error::Result;
use crate::report::{
    ActivityBand, AggregationShape, DateRange, Dimension, ParamName, ReportCatalog, ReportParams,
    ReportSpec, TimeBucket, Window,
};

// Swap fact table columns
const TS: &str = "block_timestamp";
const TX: &str = "tx_hash";
const SENDER: &str = "sender";
const SOURCE_CHAIN: &str = "source_chain";
const DESTINATION_CHAIN: &str = "destination_chain";
const TOKEN: &str = "token_symbol";

// Block fact table columns
const BLOCK_ID: &str = "fact_blocks_id";
const BLOCK_TX_COUNT: &str = "tx_count";

/// Value bound to a positional placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindValue {
    Date(NaiveDate),
    Text(String),
}

/// Window after parameters have been resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedWindow {
    Range(DateRange),
    Last24Hours,
}

/// Structured form of a statement, for warehouses that evaluate plans
/// directly instead of parsing SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub shape: AggregationShape,
    pub window: ResolvedWindow,
    pub granularity: Option<TimeBucket>,
    pub limit: Option<usize>,
}

/// A rendered, parameterized statement for one report invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub report: String,
    pub sql: String,
    pub binds: Vec<BindValue>,
    pub plan: QueryPlan,
}

/// Maps a report and its parameters to a SQL statement.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    swaps_table: String,
    blocks_table: String,
    path_separator: String,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::new(&WarehouseSettings::default())
    }
}

impl QueryBuilder {
    pub fn new(settings: &WarehouseSettings) -> Self {
        Self {
            swaps_table: settings.swaps_table.clone(),
            blocks_table: settings.blocks_table.clone(),
            path_separator: settings.path_separator.clone(),
        }
    }

    /// Look up `report` in the global catalog and render it.
    pub fn build(&self, report: &str, params: &ReportParams) -> Result<Statement> {
        let spec = ReportCatalog::global().get(report)?;
        let params = spec.normalize(params)?;
        self.build_spec(spec, &params)
    }

    /// Render an already-resolved report. `params` must be normalized.
    pub fn build_spec(&self, spec: &ReportSpec, params: &ReportParams) -> Result<Statement> {
        let window = match spec.window {
            Window::Selected => {
                let start = params.date(spec.name, ParamName::StartDate)?;
                let end = params.date(spec.name, ParamName::EndDate)?;
                ResolvedWindow::Range(DateRange::new(start, end)?)
            },
            Window::Last24Hours => ResolvedWindow::Last24Hours,
        };

        let granularity = if spec.shape.is_time_bucketed() {
            params.granularity(spec.name)?.or(spec.default_granularity)
        } else {
            None
        };

        let plan = QueryPlan {
            shape: spec.shape,
            window,
            granularity,
            limit: spec.shape.row_limit(),
        };

        let mut render = Render::new(self);
        let sql = render.statement(&plan);

        Ok(Statement {
            report: spec.name.to_string(),
            sql,
            binds: render.binds,
            plan,
        })
    }
}

/// Per-statement rendering state: the bind list and the lazily bound separator.
struct Render<'a> {
    builder: &'a QueryBuilder,
    binds: Vec<BindValue>,
    separator: Option<String>,
}

impl<'a> Render<'a> {
    fn new(builder: &'a QueryBuilder) -> Self {
        Self {
            builder,
            binds: Vec::new(),
            separator: None,
        }
    }

    fn bind(&mut self, value: BindValue) -> String {
        self.binds.push(value);
        format!("${}", self.binds.len())
    }

    fn separator(&mut self) -> String {
        if let Some(placeholder) = &self.separator {
            return placeholder.clone();
        }
        let placeholder = self.bind(BindValue::Text(self.builder.path_separator.clone()));
        self.separator = Some(placeholder.clone());
        placeholder
    }

    fn path(&mut self) -> String {
        let separator = self.separator();
        format!("{SOURCE_CHAIN} || {separator}::text || {DESTINATION_CHAIN}")
    }

    fn dimension(&mut self, dimension: Dimension) -> String {
        match dimension {
            Dimension::SourceChain => SOURCE_CHAIN.to_string(),
            Dimension::DestinationChain => DESTINATION_CHAIN.to_string(),
            Dimension::Path => self.path(),
        }
    }

    fn predicate(&mut self, window: &ResolvedWindow) -> String {
        match window {
            ResolvedWindow::Range(range) => {
                let start = self.bind(BindValue::Date(range.start()));
                let end = self.bind(BindValue::Date(range.end()));
                format!("{TS}::date >= {start}\n          AND {TS}::date <= {end}")
            },
            ResolvedWindow::Last24Hours => format!("{TS}::date >= current_date - 1"),
        }
    }

    fn statement(&mut self, plan: &QueryPlan) -> String {
        let swaps = self.builder.swaps_table.clone();
        let bucket_unit = plan.granularity.unwrap_or(TimeBucket::Week).as_str();

        match plan.shape {
            AggregationShape::Totals => {
                let predicate = self.predicate(&plan.window);
                format!(
                    "SELECT\n    COUNT(DISTINCT {TX}) AS total_swaps,\n    COUNT(DISTINCT {SENDER}) AS total_swapper,\n    {avg} AS avg_number_swaped_per_user\nFROM {swaps}\nWHERE {predicate}",
                    avg = rounded_ratio(),
                )
            },
            AggregationShape::BlockTotals => {
                let predicate = self.predicate(&plan.window);
                format!(
                    "SELECT\n    COUNT(DISTINCT {BLOCK_ID}) AS blocks_count,\n    ROUND(AVG({BLOCK_TX_COUNT}))::bigint AS avg_tx_per_block\nFROM {blocks}\nWHERE {predicate}",
                    blocks = self.builder.blocks_table,
                )
            },
            AggregationShape::TimeBucketedCount { dimension } => {
                let (dimension_select, group_by) = match dimension {
                    Some(dimension) => {
                        let expr = self.dimension(dimension);
                        (
                            format!("\n    {} AS {},", expr, dimension.column_name()),
                            "1, 2",
                        )
                    },
                    None => (String::new(), "1"),
                };
                let predicate = self.predicate(&plan.window);
                format!(
                    "SELECT\n    DATE_TRUNC('{bucket_unit}', {TS})::date AS bucket,{dimension_select}\n    COUNT(DISTINCT {TX}) AS swap_count,\n    COUNT(DISTINCT {SENDER}) AS swapper_count,\n    {avg} AS avg_swaps_per_swapper\nFROM {swaps}\nWHERE {predicate}\nGROUP BY {group_by}\nORDER BY {group_by}",
                    avg = rounded_ratio(),
                )
            },
            AggregationShape::FirstSeenCumulative => {
                let predicate = self.predicate(&plan.window);
                format!(
                    "WITH first_seen AS (\n    SELECT {SENDER}, MIN({TS}::date) AS first_date\n    FROM {swaps}\n    WHERE {predicate}\n    GROUP BY {SENDER}\n),\nper_bucket AS (\n    SELECT\n        DATE_TRUNC('{bucket_unit}', first_date)::date AS bucket,\n        COUNT(DISTINCT {SENDER}) AS new_swappers\n    FROM first_seen\n    GROUP BY 1\n)\nSELECT\n    bucket,\n    new_swappers,\n    SUM(new_swappers) OVER (ORDER BY bucket ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW)::bigint AS cumulative_swappers\nFROM per_bucket\nORDER BY bucket"
                )
            },
            AggregationShape::TopNByDimension { dimension, rank_by } => {
                let expr = self.dimension(dimension);
                let predicate = self.predicate(&plan.window);
                let column = dimension.column_name();
                format!(
                    "SELECT\n    {expr} AS {column},\n    COUNT(DISTINCT {TX}) AS swap_count,\n    COUNT(DISTINCT {SENDER}) AS swapper_count,\n    {avg} AS avg_swaps_per_swapper\nFROM {swaps}\nWHERE {predicate}\nGROUP BY 1\nORDER BY {rank} DESC, {column} ASC\nLIMIT {limit}",
                    avg = rounded_ratio(),
                    rank = rank_by.column_name(),
                    limit = plan.limit.unwrap_or(crate::report::TOP_N),
                )
            },
            AggregationShape::BucketedDistribution => {
                let predicate = self.predicate(&plan.window);
                format!(
                    "WITH per_swapper AS (\n    SELECT {SENDER}, COUNT(DISTINCT {TX}) AS swap_count\n    FROM {swaps}\n    WHERE {predicate}\n    GROUP BY {SENDER}\n)\nSELECT\n    {band} AS band,\n    COUNT(DISTINCT {SENDER}) AS swapper_count\nFROM per_swapper\nGROUP BY 1\nORDER BY MIN(swap_count)",
                    band = band_case(),
                )
            },
            AggregationShape::ShareOfBucket { dimension } => {
                let expr = self.dimension(dimension);
                let predicate = self.predicate(&plan.window);
                let column = dimension.column_name();
                format!(
                    "WITH per_bucket AS (\n    SELECT\n        DATE_TRUNC('{bucket_unit}', {TS})::date AS bucket,\n        {expr} AS {column},\n        COUNT(DISTINCT {TX}) AS swap_count\n    FROM {swaps}\n    WHERE {predicate}\n    GROUP BY 1, 2\n)\nSELECT\n    bucket,\n    {column},\n    swap_count,\n    ROUND(100.0 * swap_count / SUM(swap_count) OVER (PARTITION BY bucket), 2)::float8 AS share_pct\nFROM per_bucket\nORDER BY bucket, {column}"
                )
            },
            AggregationShape::TopEntitiesMultiMetric => {
                let path = self.path();
                let predicate = self.predicate(&plan.window);
                format!(
                    "SELECT\n    {SENDER} AS swapper,\n    COUNT(DISTINCT {TX}) AS swap_count,\n    COUNT(DISTINCT {path}) AS path_count,\n    COUNT(DISTINCT {SOURCE_CHAIN}) AS source_chain_count,\n    COUNT(DISTINCT {DESTINATION_CHAIN}) AS destination_chain_count,\n    COUNT(DISTINCT {TOKEN}) AS token_count,\n    COUNT(DISTINCT {TS}::date) AS active_days\nFROM {swaps}\nWHERE {predicate}\nGROUP BY {SENDER}\nORDER BY swap_count DESC, swapper ASC\nLIMIT {limit}",
                    limit = plan.limit.unwrap_or(crate::report::TOP_N),
                )
            },
        }
    }
}

/// Swaps per swapper, rounded half away from zero, NULL when there are no swappers.
fn rounded_ratio() -> String {
    format!("ROUND(COUNT(DISTINCT {TX})::numeric / NULLIF(COUNT(DISTINCT {SENDER}), 0))::bigint")
}

fn band_case() -> String {
    let mut case = String::from("CASE");
    for band in ActivityBand::ALL {
        match band.upper_bound() {
            Some(1) => case.push_str(&format!("\n        WHEN swap_count = 1 THEN '{}'", band.label())),
            Some(bound) => case.push_str(&format!(
                "\n        WHEN swap_count <= {} THEN '{}'",
                bound,
                band.label()
            )),
            None => case.push_str(&format!("\n        ELSE '{}'", band.label())),
        }
    }
    case.push_str("\n    END");
    case
}
