//! Job to recompute the rolling "last 24h" reports.
//!
//! Rolling reports take no parameters, so their cache key never changes. This
//! job replaces each cached result so the window follows the calendar.

use anyhow::{anyhow, Result};
use log::{error, info};

use crate::report::ReportParams;
use crate::service::ReportService;

/// Invalidates and recomputes every rolling report in the catalog.
///
/// A failing report does not stop the others. Returns the number of reports
/// refreshed, or the first failure once every report has been attempted.
pub async fn run(service: &ReportService) -> Result<usize> {
    info!("Starting refresh_rolling_reports job...");

    let start = std::time::Instant::now();
    let params = ReportParams::new();
    let mut refreshed = 0;
    let mut attempted = 0;
    let mut first_error = None;

    for spec in service.catalog().rolling() {
        attempted += 1;
        match service.refresh(spec.name, &params).await {
            Ok(result) => {
                info!("Refreshed {} ({} rows)", spec.name, result.len());
                refreshed += 1;
            },
            Err(e) => {
                error!("Failed to refresh {}: {}", spec.name, e);
                first_error.get_or_insert(e);
            },
        }
    }

    info!(
        "Completed refresh_rolling_reports job in {:?} ({}/{} reports)",
        start.elapsed(),
        refreshed,
        attempted
    );

    match first_error {
        Some(e) => Err(anyhow!(e).context(format!(
            "Refreshed {} of {} rolling reports",
            refreshed, attempted
        ))),
        None => Ok(refreshed),
    }
}
