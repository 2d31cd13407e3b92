use chrono::NaiveDate;
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

/// PostgreSQL warehouse connection configuration.
///
/// The warehouse holds the pre-populated bridge fact tables. Connections are
/// pooled with `deadpool-postgres` and only ever used for reads.
#[derive(Debug, Deserialize, Clone)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    16
}

/// Source relations queried by every report.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct WarehouseSettings {
    /// Fact table with one row per bridge swap
    #[serde(default = "default_swaps_table")]
    pub swaps_table: String,
    /// Fact table with one row per block
    #[serde(default = "default_blocks_table")]
    pub blocks_table: String,
    /// Separator placed between source and destination chain in a path
    #[serde(default = "default_path_separator")]
    pub path_separator: String,
}

fn default_swaps_table() -> String {
    "axelar.defi.ez_bridge_squid".to_string()
}

fn default_blocks_table() -> String {
    "axelar.core.fact_blocks".to_string()
}

fn default_path_separator() -> String {
    "⟂".to_string()
}

impl Default for WarehouseSettings {
    fn default() -> Self {
        Self {
            swaps_table: default_swaps_table(),
            blocks_table: default_blocks_table(),
            path_separator: default_path_separator(),
        }
    }
}

/// Result cache bounds.
///
/// Entries are evicted by size once `max_capacity` is reached. A TTL is only
/// applied when `time_to_live_secs` is set.
#[derive(Debug, Deserialize, Clone)]
pub struct CacheSettings {
    #[serde(default = "default_cache_capacity")]
    pub max_capacity: u64,
    #[serde(default)]
    pub time_to_live_secs: Option<u64>,
}

fn default_cache_capacity() -> u64 {
    1_024
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_capacity: default_cache_capacity(),
            time_to_live_secs: None,
        }
    }
}

/// Bounded retry for transient warehouse failures (exponential backoff).
#[derive(Debug, Deserialize, Clone)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    100
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

/// Date inputs used when no range has been picked yet.
#[derive(Debug, Deserialize, Clone)]
pub struct DashboardSettings {
    #[serde(default = "default_start_date")]
    pub default_start_date: NaiveDate,
    /// Defaults to today (UTC) when unset
    #[serde(default)]
    pub default_end_date: Option<NaiveDate>,
}

fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 1, 1).unwrap_or_default()
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            default_start_date: default_start_date(),
            default_end_date: None,
        }
    }
}

/// Background job intervals.
#[derive(Debug, Deserialize, Clone)]
pub struct CronSettings {
    /// Interval for recomputing the rolling "last 24h" reports - default 15 minutes
    #[serde(default = "default_rolling_refresh_interval")]
    pub rolling_refresh_interval_secs: u64,
}

fn default_rolling_refresh_interval() -> u64 {
    900
}

impl Default for CronSettings {
    fn default() -> Self {
        Self {
            rolling_refresh_interval_secs: default_rolling_refresh_interval(),
        }
    }
}

/// Root application configuration.
///
/// Loaded from `config.yaml` at startup, with `SQUIDBOARD__SECTION__KEY`
/// environment variables taking precedence.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub postgres: PostgresSettings,
    #[serde(default)]
    pub warehouse: WarehouseSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub dashboard: DashboardSettings,
    #[serde(default)]
    pub cron: CronSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config"))
            .add_source(Environment::with_prefix("SQUIDBOARD").separator("__"))
            .build()?;

        let settings: Settings = s.try_deserialize()?;

        Ok(settings)
    }

    /// Parse settings from an in-memory YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()
    }
}
