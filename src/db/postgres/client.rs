use anyhow::Context;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use log::{info, warn};
use tokio_postgres::NoTls;

use crate::config::PostgresSettings;
use crate::utils::backoff_delay;

/// Connection attempts before giving up at startup.
const MAX_CONNECT_ATTEMPTS: u32 = 3;

/// Base delay for the connect backoff.
const CONNECT_RETRY_DELAY_MS: u64 = 100;

/// Read-only PostgreSQL warehouse holding the swap and block fact tables.
///
/// Executes the statements produced by the
/// [`QueryBuilder`](crate::report::QueryBuilder) over a `deadpool-postgres`
/// connection pool.
#[derive(Clone)]
pub struct PostgresWarehouse {
    pub pool: Pool,
}

impl PostgresWarehouse {
    pub async fn new(settings: PostgresSettings) -> anyhow::Result<Self> {
        info!(
            "Connecting to PostgreSQL warehouse at {}:{}/{}",
            settings.host, settings.port, settings.database
        );

        let pool = build_pool(&settings)?;
        wait_until_ready(&pool, &settings).await?;

        info!("Successfully connected to PostgreSQL warehouse");
        Ok(Self { pool })
    }
}

fn build_pool(settings: &PostgresSettings) -> anyhow::Result<Pool> {
    let mut pg_config = tokio_postgres::Config::new();
    pg_config
        .host(&settings.host)
        .port(settings.port)
        .user(&settings.user)
        .password(&settings.password)
        .dbname(&settings.database);

    let manager = Manager::from_config(
        pg_config,
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );

    Pool::builder(manager)
        .max_size(settings.pool_size)
        .build()
        .context("Failed to create PostgreSQL connection pool")
}

/// Check out one connection, backing off between failed attempts.
async fn wait_until_ready(pool: &Pool, settings: &PostgresSettings) -> anyhow::Result<()> {
    let mut attempt = 0;
    loop {
        match pool.get().await {
            Ok(_conn) => return Ok(()),
            Err(e) if attempt + 1 < MAX_CONNECT_ATTEMPTS => {
                let delay = backoff_delay(CONNECT_RETRY_DELAY_MS, attempt);
                attempt += 1;
                warn!(
                    "Warehouse {}:{} unavailable (attempt {}/{}), retrying in {:?}: {}",
                    settings.host, settings.port, attempt, MAX_CONNECT_ATTEMPTS, delay, e
                );
                tokio::time::sleep(delay).await;
            },
            Err(e) => {
                return Err(anyhow::Error::new(e)).with_context(|| {
                    format!(
                        "Failed to connect to PostgreSQL after {} attempts",
                        MAX_CONNECT_ATTEMPTS
                    )
                });
            },
        }
    }
}
