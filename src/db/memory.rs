//! In-process warehouse evaluating query plans over fact rows held in memory.
//!
//! Produces the same columns, ordering and NULL behaviour as the SQL the
//! [`QueryBuilder`](crate::report::QueryBuilder) renders, which makes it the
//! backend for local runs and for exercising the pipeline end to end.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime, Utc};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::WarehouseSettings;
use crate::db::models::{BlockRecord, SwapRecord};
use crate::db::{TabularResult, Value, WarehouseClient};
use crate::error::Result;
use crate::report::{
    ActivityBand, AggregationShape, BindValue, Dimension, QueryPlan, RankMetric, ResolvedWindow,
    Statement, TimeBucket, TOP_N,
};
use crate::utils::{round_to, rounded_ratio};

/// Distinct swaps and swappers of a group.
#[derive(Default)]
struct Activity<'a> {
    txs: FxHashSet<&'a str>,
    senders: FxHashSet<&'a str>,
}

impl<'a> Activity<'a> {
    fn record(&mut self, swap: &'a SwapRecord) {
        self.txs.insert(&swap.tx_hash);
        self.senders.insert(&swap.sender);
    }

    fn swap_count(&self) -> u64 {
        self.txs.len() as u64
    }

    fn swapper_count(&self) -> u64 {
        self.senders.len() as u64
    }

    fn rank(&self, metric: RankMetric) -> u64 {
        match metric {
            RankMetric::Swaps => self.swap_count(),
            RankMetric::Swappers => self.swapper_count(),
        }
    }

    fn counts(&self) -> [Value; 3] {
        [
            Value::Int(self.swap_count() as i64),
            Value::Int(self.swapper_count() as i64),
            rounded_ratio(self.swap_count(), self.swapper_count()).into(),
        ]
    }
}

/// Per-swapper distinct counts for the multi-metric ranking.
#[derive(Default)]
struct SwapperProfile<'a> {
    txs: FxHashSet<&'a str>,
    paths: FxHashSet<String>,
    sources: FxHashSet<&'a str>,
    destinations: FxHashSet<&'a str>,
    tokens: FxHashSet<&'a str>,
    days: FxHashSet<NaiveDate>,
}

/// Warehouse backed by vectors of fact rows.
pub struct InMemoryWarehouse {
    swaps: Vec<SwapRecord>,
    blocks: Vec<BlockRecord>,
    /// Reference date for rolling windows (`current_date`)
    today: NaiveDate,
    executions: AtomicUsize,
}

impl InMemoryWarehouse {
    pub fn new(swaps: Vec<SwapRecord>, blocks: Vec<BlockRecord>) -> Self {
        Self {
            swaps,
            blocks,
            today: Utc::now().date_naive(),
            executions: AtomicUsize::new(0),
        }
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Number of statements executed so far.
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    fn in_window(&self, window: &ResolvedWindow, ts: NaiveDateTime) -> bool {
        let date = ts.date();
        match window {
            ResolvedWindow::Range(range) => range.contains(date),
            ResolvedWindow::Last24Hours => date >= self.today - Duration::days(1),
        }
    }

    fn swaps_in<'a>(
        &'a self,
        window: &'a ResolvedWindow,
    ) -> impl Iterator<Item = &'a SwapRecord> + 'a {
        self.swaps
            .iter()
            .filter(move |swap| self.in_window(window, swap.block_timestamp))
    }

    /// Evaluate a statement's plan into rows laid out per the shape's column
    /// contract. Paths are joined with the separator bound to the statement.
    pub fn evaluate(&self, statement: &Statement) -> TabularResult {
        let separator = bound_separator(statement);
        self.evaluate_plan(&statement.plan, &separator)
    }

    fn evaluate_plan(&self, plan: &QueryPlan, separator: &str) -> TabularResult {
        let mut result = TabularResult::from_specs(&plan.shape.output_columns());
        let bucket = plan.granularity.unwrap_or(TimeBucket::Week);
        let limit = plan.limit.unwrap_or(TOP_N);

        match plan.shape {
            AggregationShape::Totals => {
                let mut activity = Activity::default();
                for swap in self.swaps_in(&plan.window) {
                    activity.record(swap);
                }
                result.push_row(activity.counts().to_vec());
            },
            AggregationShape::BlockTotals => {
                let mut ids = FxHashSet::default();
                let mut tx_total = 0_i64;
                let mut block_rows = 0_i64;
                for block in self
                    .blocks
                    .iter()
                    .filter(|b| self.in_window(&plan.window, b.block_timestamp))
                {
                    ids.insert(block.fact_blocks_id);
                    tx_total += block.tx_count;
                    block_rows += 1;
                }
                let avg = (block_rows > 0)
                    .then(|| (tx_total as f64 / block_rows as f64).round() as i64);
                result.push_row(vec![Value::Int(ids.len() as i64), avg.into()]);
            },
            AggregationShape::TimeBucketedCount { dimension } => {
                let mut groups: BTreeMap<(NaiveDate, String), Activity> = BTreeMap::new();
                for swap in self.swaps_in(&plan.window) {
                    let key = (
                        bucket.truncate(swap.block_timestamp.date()),
                        dimension
                            .map(|d| dimension_value(d, swap, separator))
                            .unwrap_or_default(),
                    );
                    groups.entry(key).or_default().record(swap);
                }
                for ((date, value), activity) in groups {
                    let mut row = vec![Value::Date(date)];
                    if dimension.is_some() {
                        row.push(Value::Text(value));
                    }
                    row.extend(activity.counts());
                    result.push_row(row);
                }
            },
            AggregationShape::FirstSeenCumulative => {
                let mut first_seen: FxHashMap<&str, NaiveDate> = FxHashMap::default();
                for swap in self.swaps_in(&plan.window) {
                    let date = swap.block_timestamp.date();
                    first_seen
                        .entry(&swap.sender)
                        .and_modify(|d| *d = (*d).min(date))
                        .or_insert(date);
                }
                let mut per_bucket: BTreeMap<NaiveDate, i64> = BTreeMap::new();
                for date in first_seen.values() {
                    *per_bucket.entry(bucket.truncate(*date)).or_default() += 1;
                }
                let mut cumulative = 0;
                for (date, new_swappers) in per_bucket {
                    cumulative += new_swappers;
                    result.push_row(vec![
                        Value::Date(date),
                        Value::Int(new_swappers),
                        Value::Int(cumulative),
                    ]);
                }
            },
            AggregationShape::TopNByDimension { dimension, rank_by } => {
                let mut groups: FxHashMap<String, Activity> = FxHashMap::default();
                for swap in self.swaps_in(&plan.window) {
                    groups
                        .entry(dimension_value(dimension, swap, separator))
                        .or_default()
                        .record(swap);
                }
                let mut ranked: Vec<_> = groups.into_iter().collect();
                ranked.sort_by(|(a_name, a), (b_name, b)| {
                    b.rank(rank_by)
                        .cmp(&a.rank(rank_by))
                        .then_with(|| a_name.cmp(b_name))
                });
                for (name, activity) in ranked.into_iter().take(limit) {
                    let mut row = vec![Value::Text(name)];
                    row.extend(activity.counts());
                    result.push_row(row);
                }
            },
            AggregationShape::BucketedDistribution => {
                let mut per_sender: FxHashMap<&str, FxHashSet<&str>> = FxHashMap::default();
                for swap in self.swaps_in(&plan.window) {
                    per_sender
                        .entry(&swap.sender)
                        .or_default()
                        .insert(&swap.tx_hash);
                }
                let mut per_band: BTreeMap<ActivityBand, i64> = BTreeMap::new();
                for txs in per_sender.values() {
                    *per_band
                        .entry(ActivityBand::classify(txs.len() as u64))
                        .or_default() += 1;
                }
                for (band, swappers) in per_band {
                    result.push_row(vec![Value::Text(band.label().to_string()), Value::Int(swappers)]);
                }
            },
            AggregationShape::ShareOfBucket { dimension } => {
                let mut groups: BTreeMap<(NaiveDate, String), FxHashSet<&str>> = BTreeMap::new();
                for swap in self.swaps_in(&plan.window) {
                    groups
                        .entry((
                            bucket.truncate(swap.block_timestamp.date()),
                            dimension_value(dimension, swap, separator),
                        ))
                        .or_default()
                        .insert(&swap.tx_hash);
                }
                let mut bucket_totals: BTreeMap<NaiveDate, u64> = BTreeMap::new();
                for ((date, _), txs) in &groups {
                    *bucket_totals.entry(*date).or_default() += txs.len() as u64;
                }
                for ((date, value), txs) in groups {
                    let count = txs.len() as u64;
                    let total = bucket_totals.get(&date).copied().unwrap_or(count);
                    let share = round_to(100.0 * count as f64 / total as f64, 2);
                    result.push_row(vec![
                        Value::Date(date),
                        Value::Text(value),
                        Value::Int(count as i64),
                        Value::Float(share),
                    ]);
                }
            },
            AggregationShape::TopEntitiesMultiMetric => {
                let mut profiles: FxHashMap<&str, SwapperProfile> = FxHashMap::default();
                for swap in self.swaps_in(&plan.window) {
                    let profile = profiles.entry(&swap.sender).or_default();
                    profile.txs.insert(&swap.tx_hash);
                    profile.paths.insert(swap.path(separator));
                    profile.sources.insert(&swap.source_chain);
                    profile.destinations.insert(&swap.destination_chain);
                    profile.tokens.insert(&swap.token_symbol);
                    profile.days.insert(swap.block_timestamp.date());
                }
                let mut ranked: Vec<_> = profiles.into_iter().collect();
                ranked.sort_by(|(a_name, a), (b_name, b)| {
                    b.txs.len().cmp(&a.txs.len()).then_with(|| a_name.cmp(b_name))
                });
                for (sender, profile) in ranked.into_iter().take(limit) {
                    result.push_row(vec![
                        Value::Text(sender.to_string()),
                        Value::Int(profile.txs.len() as i64),
                        Value::Int(profile.paths.len() as i64),
                        Value::Int(profile.sources.len() as i64),
                        Value::Int(profile.destinations.len() as i64),
                        Value::Int(profile.tokens.len() as i64),
                        Value::Int(profile.days.len() as i64),
                    ]);
                }
            },
        }

        result
    }
}

/// The path separator travels as the statement's only text bind.
fn bound_separator(statement: &Statement) -> String {
    statement
        .binds
        .iter()
        .find_map(|bind| match bind {
            BindValue::Text(text) => Some(text.clone()),
            BindValue::Date(_) => None,
        })
        .unwrap_or_else(|| WarehouseSettings::default().path_separator)
}

fn dimension_value(dimension: Dimension, swap: &SwapRecord, separator: &str) -> String {
    match dimension {
        Dimension::SourceChain => swap.source_chain.clone(),
        Dimension::DestinationChain => swap.destination_chain.clone(),
        Dimension::Path => swap.path(separator),
    }
}

#[async_trait]
impl WarehouseClient for InMemoryWarehouse {
    async fn execute(&self, statement: &Statement) -> Result<TabularResult> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        Ok(self.evaluate(statement))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{names, DateRange, QueryBuilder, ReportParams};

    fn ts(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn swap(at: NaiveDateTime, tx: &str, sender: &str, from: &str, to: &str) -> SwapRecord {
        SwapRecord::new(at, tx, sender, from, to, "USDC")
    }

    fn january() -> ReportParams {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2022, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2022, 1, 31).unwrap(),
        )
        .unwrap();
        ReportParams::for_range(&range)
    }

    fn run(warehouse: &InMemoryWarehouse, report: &str, params: &ReportParams) -> TabularResult {
        let statement = QueryBuilder::default().build(report, params).unwrap();
        warehouse.evaluate(&statement)
    }

    #[test]
    fn test_totals_scenario() {
        let warehouse = InMemoryWarehouse::new(
            vec![
                swap(ts(2022, 1, 3, 1), "0x1", "A", "ethereum", "polygon"),
                swap(ts(2022, 1, 4, 1), "0x2", "A", "ethereum", "polygon"),
                swap(ts(2022, 1, 5, 1), "0x3", "B", "avalanche", "base"),
                // outside the window
                swap(ts(2022, 2, 1, 0), "0x4", "C", "avalanche", "base"),
            ],
            vec![],
        );

        let result = run(&warehouse, names::SWAP_TOTALS, &january());
        assert_eq!(result.len(), 1);
        assert_eq!(result.value(0, "total_swaps"), Some(&Value::Int(3)));
        assert_eq!(result.value(0, "total_swapper"), Some(&Value::Int(2)));
        assert_eq!(
            result.value(0, "avg_number_swaped_per_user"),
            Some(&Value::Int(2))
        );
    }

    #[test]
    fn test_totals_with_no_swappers_yields_null_average() {
        let warehouse = InMemoryWarehouse::new(vec![], vec![]);
        let result = run(&warehouse, names::SWAP_TOTALS, &january());
        assert_eq!(result.value(0, "total_swaps"), Some(&Value::Int(0)));
        assert_eq!(result.value(0, "total_swapper"), Some(&Value::Int(0)));
        assert_eq!(
            result.value(0, "avg_number_swaped_per_user"),
            Some(&Value::Null)
        );
    }

    #[test]
    fn test_duplicate_rows_of_one_tx_count_once() {
        let warehouse = InMemoryWarehouse::new(
            vec![
                swap(ts(2022, 1, 3, 1), "0x1", "A", "ethereum", "polygon"),
                swap(ts(2022, 1, 3, 1), "0x1", "A", "ethereum", "polygon"),
            ],
            vec![],
        );
        let result = run(&warehouse, names::SWAP_TOTALS, &january());
        assert_eq!(result.value(0, "total_swaps"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_rolling_window_uses_reference_date() {
        let warehouse = InMemoryWarehouse::new(
            vec![
                swap(ts(2024, 3, 9, 23), "0x1", "A", "ethereum", "polygon"),
                swap(ts(2024, 3, 10, 1), "0x2", "B", "ethereum", "polygon"),
                swap(ts(2024, 3, 8, 23), "0x3", "C", "ethereum", "polygon"),
            ],
            vec![
                BlockRecord::new(1, ts(2024, 3, 10, 0), 4),
                BlockRecord::new(2, ts(2024, 3, 10, 0), 5),
                BlockRecord::new(3, ts(2024, 3, 1, 0), 100),
            ],
        )
        .with_today(NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());

        let swaps = run(&warehouse, names::SWAP_TOTALS_LAST_24H, &ReportParams::new());
        assert_eq!(swaps.value(0, "total_swaps"), Some(&Value::Int(2)));

        let blocks = run(&warehouse, names::BLOCK_TOTALS_LAST_24H, &ReportParams::new());
        assert_eq!(blocks.value(0, "blocks_count"), Some(&Value::Int(2)));
        // 4.5 rounds half away from zero
        assert_eq!(blocks.value(0, "avg_tx_per_block"), Some(&Value::Int(5)));
    }

    #[test]
    fn test_block_totals_on_empty_window() {
        let warehouse = InMemoryWarehouse::new(vec![], vec![]);
        let result = run(&warehouse, names::BLOCK_TOTALS, &january());
        assert_eq!(result.value(0, "blocks_count"), Some(&Value::Int(0)));
        assert_eq!(result.value(0, "avg_tx_per_block"), Some(&Value::Null));
    }

    #[test]
    fn test_weekly_buckets_ascend() {
        let warehouse = InMemoryWarehouse::new(
            vec![
                swap(ts(2022, 1, 12, 1), "0x3", "B", "ethereum", "polygon"),
                swap(ts(2022, 1, 3, 1), "0x1", "A", "ethereum", "polygon"),
                swap(ts(2022, 1, 4, 1), "0x2", "A", "ethereum", "polygon"),
            ],
            vec![],
        );
        let result = run(&warehouse, names::SWAP_ACTIVITY, &january());
        let buckets: Vec<_> = result
            .column_values("bucket")
            .into_iter()
            .filter_map(Value::as_date)
            .collect();
        assert_eq!(
            buckets,
            vec![
                NaiveDate::from_ymd_opt(2022, 1, 3).unwrap(),
                NaiveDate::from_ymd_opt(2022, 1, 10).unwrap()
            ]
        );
        assert_eq!(result.value(0, "swap_count"), Some(&Value::Int(2)));
        assert_eq!(result.value(0, "swapper_count"), Some(&Value::Int(1)));
        assert_eq!(result.value(0, "avg_swaps_per_swapper"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_paths_use_the_statement_separator() {
        let warehouse = InMemoryWarehouse::new(
            vec![swap(ts(2022, 1, 3, 1), "0x1", "A", "ethereum", "polygon")],
            vec![],
        );
        let builder = QueryBuilder::new(&WarehouseSettings {
            path_separator: "->".to_string(),
            ..WarehouseSettings::default()
        });

        for report in [names::TOP_PATHS_BY_SWAPS, names::PATH_ACTIVITY, names::PATH_SWAP_SHARE] {
            let statement = builder.build(report, &january()).unwrap();
            assert!(statement.binds.contains(&BindValue::Text("->".to_string())));

            let result = warehouse.evaluate(&statement);
            assert_eq!(
                result.value(0, "path").and_then(Value::as_str),
                Some("ethereum->polygon"),
                "{report}"
            );
        }
    }

    #[test]
    fn test_top_swappers_metrics() {
        let warehouse = InMemoryWarehouse::new(
            vec![
                SwapRecord::new(ts(2022, 1, 3, 1), "0x1", "A", "ethereum", "polygon", "USDC"),
                SwapRecord::new(ts(2022, 1, 3, 2), "0x2", "A", "polygon", "ethereum", "WETH"),
                SwapRecord::new(ts(2022, 1, 5, 1), "0x3", "A", "ethereum", "arbitrum", "USDC"),
                SwapRecord::new(ts(2022, 1, 5, 1), "0x4", "B", "ethereum", "arbitrum", "USDC"),
            ],
            vec![],
        );
        let result = run(&warehouse, names::TOP_SWAPPERS, &january());
        assert_eq!(result.len(), 2);
        assert_eq!(result.value(0, "swapper").and_then(Value::as_str), Some("A"));
        assert_eq!(result.value(0, "swap_count"), Some(&Value::Int(3)));
        assert_eq!(result.value(0, "path_count"), Some(&Value::Int(3)));
        assert_eq!(result.value(0, "source_chain_count"), Some(&Value::Int(2)));
        assert_eq!(result.value(0, "destination_chain_count"), Some(&Value::Int(3)));
        assert_eq!(result.value(0, "token_count"), Some(&Value::Int(2)));
        assert_eq!(result.value(0, "active_days"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_share_of_bucket_sums_to_hundred() {
        let warehouse = InMemoryWarehouse::new(
            vec![
                swap(ts(2022, 1, 3, 1), "0x1", "A", "ethereum", "polygon"),
                swap(ts(2022, 1, 4, 1), "0x2", "B", "ethereum", "polygon"),
                swap(ts(2022, 1, 5, 1), "0x3", "C", "avalanche", "base"),
            ],
            vec![],
        );
        let result = run(&warehouse, names::PATH_SWAP_SHARE, &january());
        assert_eq!(result.len(), 2);
        assert_eq!(
            result.value(0, "path").and_then(Value::as_str),
            Some("avalanche⟂base")
        );
        assert_eq!(result.value(0, "share_pct"), Some(&Value::Float(33.33)));
        assert_eq!(result.value(1, "share_pct"), Some(&Value::Float(66.67)));
    }

    #[tokio::test]
    async fn test_executions_are_counted() {
        let warehouse = InMemoryWarehouse::new(vec![], vec![]);
        let statement = QueryBuilder::default()
            .build(names::SWAP_TOTALS, &january())
            .unwrap();
        warehouse.execute(&statement).await.unwrap();
        warehouse.execute(&statement).await.unwrap();
        assert_eq!(warehouse.executions(), 2);
    }
}
