//! PostgreSQL connectivity for the `postgres` store backend
//!
//! Owns the sqlx pool: option building from [`DatabaseConfig`], a startup
//! connect with a short retry (the database container often comes up after
//! us), embedded migrations, and pool statistics.

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::ConnectOptions;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument, warn};

const CONNECT_ATTEMPTS: u32 = 3;
const CONNECT_BACKOFF: Duration = Duration::from_millis(500);
const SLOW_STATEMENT: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    max_connections: u32,
}

impl Database {
    /// Connect and verify the pool, retrying transient failures
    #[instrument(skip(config), fields(max = config.max_connections))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = connect_options(config)?;
        let mut backoff = CONNECT_BACKOFF;
        let mut attempt = 1;

        let pool = loop {
            match pool_options(config).connect_with(options.clone()).await {
                Ok(pool) => break pool,
                Err(e) if attempt < CONNECT_ATTEMPTS => {
                    warn!(
                        attempt,
                        "Database not reachable ({}), retrying in {:?}", e, backoff
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(Error::Database {
                        message: format!(
                            "Failed to connect after {} attempts: {}",
                            CONNECT_ATTEMPTS, e
                        )
                        .into(),
                        source: Some(e),
                    })
                }
            }
        };

        let db = Self {
            pool,
            max_connections: config.max_connections,
        };
        db.health_check().await?;

        let stats = db.stats();
        info!(
            "Database pool ready ({} open, {} idle, max {})",
            stats.size, stats.idle, stats.max
        );
        Ok(db)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded schema migrations
    #[instrument(skip(self))]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Migration(e.to_string()))?;
        info!("Event schema migrations applied");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        if self.pool.is_closed() {
            return Err(Error::StoreUnavailable {
                backend: "postgres",
            });
        }
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::Database {
                message: format!("Health check failed: {}", e).into(),
                source: Some(e),
            })?;
        Ok(())
    }

    pub fn stats(&self) -> PoolStats {
        let size = self.pool.size();
        let idle = self.pool.num_idle();
        PoolStats {
            size,
            idle,
            in_use: (size as usize).saturating_sub(idle),
            max: self.max_connections,
        }
    }

    /// Close all connections, waiting for checked-out ones to return
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database pool closed");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub size: u32,
    pub idle: usize,
    pub in_use: usize,
    pub max: u32,
}

fn connect_options(config: &DatabaseConfig) -> Result<PgConnectOptions> {
    let options = PgConnectOptions::from_str(&config.url).map_err(|e| Error::Config {
        message: format!("Invalid database URL: {}", e).into(),
        source: Some(Box::new(e)),
    })?;

    Ok(options
        .statement_cache_capacity(config.statement_cache_size)
        .log_statements(log::LevelFilter::Debug)
        .log_slow_statements(log::LevelFilter::Warn, SLOW_STATEMENT))
}

fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connect_timeout)
        .idle_timeout(Some(config.idle_timeout))
        .max_lifetime(Some(config.max_lifetime))
}

#[cfg(test)]
pub(crate) fn test_config(url: String) -> DatabaseConfig {
    DatabaseConfig {
        url,
        max_connections: 4,
        min_connections: 1,
        connect_timeout: Duration::from_secs(5),
        idle_timeout: Duration::from_secs(60),
        max_lifetime: Duration::from_secs(300),
        statement_cache_size: 10,
    }
}
