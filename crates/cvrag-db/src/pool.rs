//! PostgreSQL pool setup for the read-only chunk path.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use cvrag_core::config::env_parse;
use cvrag_core::{Error, Result};

/// Reported to PostgreSQL as `application_name`.
pub const APPLICATION_NAME: &str = "cvrag";

/// Pool sizing and timeouts.
///
/// Every search tool call holds a connection for one short read, so a
/// handful of connections serves many concurrent chats.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long a search waits for a free connection.
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            min_connections: 0,
            acquire_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(300),
            max_lifetime: Some(Duration::from_secs(1800)),
        }
    }
}

impl PoolConfig {
    /// Defaults overridden by `DATABASE_MAX_CONNECTIONS`,
    /// `DATABASE_MIN_CONNECTIONS` and `DATABASE_ACQUIRE_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(n) = env_parse("DATABASE_MAX_CONNECTIONS")? {
            config.max_connections = n;
        }
        if let Some(n) = env_parse("DATABASE_MIN_CONNECTIONS")? {
            config.min_connections = n;
        }
        if let Some(secs) = env_parse("DATABASE_ACQUIRE_TIMEOUT_SECS")? {
            config.acquire_timeout = Duration::from_secs(secs);
        }
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(Error::Config(
                "DATABASE_MAX_CONNECTIONS must be positive".to_string(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(Error::Config(format!(
                "DATABASE_MIN_CONNECTIONS ({}) exceeds DATABASE_MAX_CONNECTIONS ({})",
                self.min_connections, self.max_connections
            )));
        }
        Ok(())
    }
}

/// Connect with [`PoolConfig::default`].
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    create_pool_with_config(database_url, PoolConfig::default()).await
}

/// Connect to `database_url`.
///
/// A malformed URL is [`Error::Config`]; an unreachable server is
/// [`Error::Database`].
pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    config.validate()?;
    let start = Instant::now();

    let options: PgConnectOptions = database_url
        .parse()
        .map_err(|e| Error::Config(format!("Invalid DATABASE_URL: {}", e)))?;

    let mut pool_options = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout);
    if let Some(lifetime) = config.max_lifetime {
        pool_options = pool_options.max_lifetime(lifetime);
    }

    let pool = pool_options
        .connect_with(options.application_name(APPLICATION_NAME))
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "db",
        component = "pool",
        op = "connect",
        max_connections = config.max_connections,
        acquire_timeout_secs = config.acquire_timeout.as_secs(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Chunk store pool ready"
    );
    Ok(pool)
}

/// Debug-log pool occupancy; warn when every connection is busy.
pub fn log_pool_metrics(pool: &PgPool) {
    let (size, idle) = (pool.size(), pool.num_idle());
    debug!(subsystem = "db", component = "pool", pool_size = size, pool_idle = idle);

    if size > 0 && idle == 0 {
        warn!(
            subsystem = "db",
            component = "pool",
            pool_size = size,
            "All pooled connections busy; searches may queue"
        );
    }
}
