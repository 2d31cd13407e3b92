use std::sync::Arc;

use anyhow::Context;
use jemallocator::Jemalloc;
use log::{error, info, LevelFilter};
use simple_logger::SimpleLogger;
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use squidboard::{
    dashboard::{default_range, DashboardSession, Page},
    CronScheduler, PostgresWarehouse, ReportService, Settings, WarehouseClient,
};

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .context("Failed to initialize logger")?;

    // Load configuration
    let settings = Arc::new(
        Settings::new()
            .context("Failed to load config.yaml. Please ensure it exists and is valid")?,
    );

    let warehouse = PostgresWarehouse::new(settings.postgres.clone())
        .await
        .context("Failed to initialize warehouse connection")?;
    warehouse
        .health_check()
        .await
        .context("Warehouse health check failed")?;

    let service = Arc::new(ReportService::from_settings(
        Arc::new(warehouse),
        &settings,
    ));

    let cancellation_token = CancellationToken::new();

    run_dashboard(settings, service, cancellation_token).await
}

async fn run_dashboard(
    settings: Arc<Settings>,
    service: Arc<ReportService>,
    cancellation_token: CancellationToken,
) -> anyhow::Result<()> {
    // Keeps the rolling "last 24h" reports current
    let cron_scheduler = CronScheduler::new(service.clone(), settings.cron.clone());

    let cron_token = cancellation_token.child_token();
    let cron_handle = tokio::spawn(async move {
        if let Err(e) = cron_scheduler.run(cron_token).await {
            error!("Cron scheduler failed: {:#}", e);
        }
    });

    info!("Cron scheduler started - rolling reports will refresh periodically");

    let range = default_range(&settings.dashboard).context("Invalid default date range")?;
    let session = DashboardSession::new(service.clone(), range);

    for page in Page::ALL {
        match session.render(page).await {
            Ok(rendered) => {
                let json = serde_json::to_string_pretty(&rendered.to_json())
                    .context("Failed to serialize page")?;
                println!("{json}");
            },
            Err(e) => error!("Failed to render page {}: {}", page, e),
        }
    }

    #[cfg(unix)]
    let mut sigterm_stream = {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?
    };

    info!("Dashboard running. Press Ctrl+C to stop.");

    #[cfg(unix)]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
            _ = sigterm_stream.recv() => {
                info!("Received SIGTERM, exiting gracefully...");
            },
        };
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
        };
    }

    info!("Finishing all tasks...");

    cancellation_token.cancel();

    info!("Waiting for cron scheduler to stop...");
    let _ = cron_handle.await;

    info!("Shutdown complete");
    Ok(())
}
