//! Database connection pooling and the Postgres-backed prediction store.

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::env;
use std::time::Duration;

pub mod predictions;

pub use predictions::PgPredictionStore;

/// Database pool configuration shared by the engine services.
#[derive(Debug, Clone)]
pub struct DbPoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for DbPoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

/// Connect a pool using `DATABASE_URL` (or an explicit URL) and the given
/// pool configuration.
pub async fn connect_pool(url: Option<&str>, config: &DbPoolConfig) -> Result<PgPool> {
    let url = match url {
        Some(url) => url.to_string(),
        None => env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
    };

    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .connect(&url)
        .await
        .context("failed to connect database pool")
}
