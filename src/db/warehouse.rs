use async_trait::async_trait;

use crate::db::TabularResult;
use crate::error::Result;
use crate::report::Statement;

/// Read-only access to the warehouse holding the fact tables.
///
/// Implementations execute one statement and return its rows. Failures are
/// reported as [`AnalyticsError::QueryExecution`](crate::AnalyticsError),
/// with `transient` set for connectivity-class errors that may be retried.
#[async_trait]
pub trait WarehouseClient: Send + Sync {
    async fn execute(&self, statement: &Statement) -> Result<TabularResult>;

    /// Verify the warehouse is reachable.
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
