pub mod cache;
pub mod config;
pub mod cron;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod report;
pub mod service;
pub mod utils;

pub use cache::ResultCache;
pub use config::{CronSettings, Settings};
pub use cron::CronScheduler;
pub use db::{InMemoryWarehouse, PostgresWarehouse, TabularResult, WarehouseClient};
pub use error::{AnalyticsError, Result};
pub use report::{DateRange, QueryBuilder, ReportCatalog, ReportParams};
pub use service::ReportService;
