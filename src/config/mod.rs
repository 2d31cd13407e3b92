#[allow(clippy::module_inception)]
mod config;

pub use config::{
    CacheSettings, CronSettings, DashboardSettings, PostgresSettings, RetrySettings, Settings,
    WarehouseSettings,
};
