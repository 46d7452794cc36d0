//! Server settings read from the environment.

use std::path::PathBuf;
use std::time::Duration;

use cvrag_core::config::{env_parse, env_string};
use cvrag_core::{defaults, Error, Result};
use cvrag_db::PoolConfig;

/// Default allowed CORS origins when `CORS_ALLOWED_ORIGINS` is unset.
pub const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

/// Global request quota.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Requests allowed per period (burst size).
    pub requests: u32,
    pub period: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests: 60,
            period: Duration::from_secs(60),
        }
    }
}

/// Where CV chunks are read from.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkSource {
    /// PostgreSQL + pgvector, read from `table`.
    Postgres {
        database_url: String,
        table: String,
        pool: PoolConfig,
    },
    /// A JSON array of chunks loaded into memory at startup.
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,
    /// `None` disables rate limiting.
    pub rate_limit: Option<RateLimitConfig>,
    pub allowed_origins: Vec<String>,
    pub chunks: ChunkSource,
    /// Apply pending migrations at startup (Postgres only).
    pub run_migrations: bool,
}

impl ServerConfig {
    /// Local defaults reading chunks from `chunks`.
    pub fn with_chunks(chunks: ChunkSource) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: defaults::PORT,
            max_body_bytes: defaults::MAX_BODY_BYTES,
            rate_limit: Some(RateLimitConfig::default()),
            allowed_origins: split_origins(DEFAULT_ALLOWED_ORIGINS),
            chunks,
            run_migrations: false,
        }
    }

    /// Read settings from the environment.
    ///
    /// `DATABASE_URL` is required unless `CV_CHUNKS_FILE` points at a JSON
    /// chunk export.
    pub fn from_env() -> Result<Self> {
        let chunks = match env_string("CV_CHUNKS_FILE") {
            Some(path) => ChunkSource::File(PathBuf::from(path)),
            None => ChunkSource::Postgres {
                database_url: env_string("DATABASE_URL").ok_or_else(|| {
                    Error::Config(
                        "DATABASE_URL is not set (or set CV_CHUNKS_FILE to serve from a file)"
                            .to_string(),
                    )
                })?,
                table: env_string("CHUNK_TABLE")
                    .unwrap_or_else(|| defaults::CHUNK_TABLE.to_string()),
                pool: PoolConfig::from_env()?,
            },
        };

        let rate_limit = if env_parse::<bool>("RATE_LIMIT_ENABLED")?.unwrap_or(true) {
            let requests: u32 = env_parse("RATE_LIMIT_REQUESTS")?.unwrap_or(60);
            let period_secs: u64 = env_parse("RATE_LIMIT_PERIOD_SECS")?.unwrap_or(60);
            if requests == 0 || period_secs == 0 {
                return Err(Error::Config(
                    "RATE_LIMIT_REQUESTS and RATE_LIMIT_PERIOD_SECS must be positive".to_string(),
                ));
            }
            Some(RateLimitConfig {
                requests,
                period: Duration::from_secs(period_secs),
            })
        } else {
            None
        };

        let max_body_bytes = env_parse("MAX_BODY_BYTES")?.unwrap_or(defaults::MAX_BODY_BYTES);
        if max_body_bytes == 0 {
            return Err(Error::Config("MAX_BODY_BYTES must be positive".to_string()));
        }

        Ok(Self {
            host: env_string("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: env_parse("PORT")?.unwrap_or(defaults::PORT),
            max_body_bytes,
            rate_limit,
            allowed_origins: split_origins(
                &env_string("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string()),
            ),
            chunks,
            run_migrations: env_parse("RUN_MIGRATIONS")?.unwrap_or(false),
        })
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
