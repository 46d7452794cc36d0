//! Shared application state and startup wiring.

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{Quota, RateLimiter};
use tracing::info;

use cvrag_agent::Agent;
use cvrag_core::{AgentConfig, ChatBackend, EmbeddingBackend, Result, VectorStore};
use cvrag_db::{Database, MemoryChunkStore};
use cvrag_inference::{OpenAIBackend, OpenAIConfig};

use crate::config::{ChunkSource, RateLimitConfig, ServerConfig};

/// Global rate limiter type (direct quota, no per-client bucketing).
pub type GlobalRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub agent: Agent,
    /// `None` when chunks are served from a file.
    pub db: Option<Database>,
    /// Probed by `/health`.
    pub gateway: Arc<dyn ChatBackend>,
    /// Global rate limiter (None if rate limiting is disabled).
    pub rate_limiter: Option<Arc<GlobalRateLimiter>>,
}

impl AppState {
    pub fn new(
        agent: Agent,
        db: Option<Database>,
        gateway: Arc<dyn ChatBackend>,
        rate_limit: Option<&RateLimitConfig>,
    ) -> Self {
        Self {
            agent,
            db,
            gateway,
            rate_limiter: rate_limit.and_then(build_rate_limiter),
        }
    }

    /// Connect the gateway and chunk store described by the configuration.
    ///
    /// Every configuration problem surfaces here, before the server binds.
    pub async fn bootstrap(
        server: &ServerConfig,
        agent_config: AgentConfig,
        mut gateway_config: OpenAIConfig,
    ) -> Result<Self> {
        agent_config.validate()?;
        gateway_config.embed_model = agent_config.embed_model.clone();
        let gateway = Arc::new(OpenAIBackend::new(gateway_config)?);
        let dimension = gateway.dimension();

        let (store, db): (Arc<dyn VectorStore>, Option<Database>) = match &server.chunks {
            ChunkSource::Postgres {
                database_url,
                table,
                pool,
            } => {
                let db = Database::connect_with_config(database_url, dimension, pool.clone())
                    .await?
                    .with_chunk_table(table)?;
                if server.run_migrations {
                    db.migrate().await?;
                    info!(subsystem = "api", op = "migrate", "Migrations applied");
                }
                (Arc::new(db.chunks.clone()), Some(db))
            }
            ChunkSource::File(path) => (
                Arc::new(MemoryChunkStore::load_json_file(dimension, path).await?),
                None,
            ),
        };

        info!(
            subsystem = "api",
            op = "bootstrap",
            chat_model = %agent_config.chat_model,
            embed_model = %agent_config.embed_model,
            dimension = dimension,
            max_steps = agent_config.max_steps,
            timeout_ms = agent_config.timeout_ms,
            "Agent configured"
        );

        let agent = Agent::new(agent_config, gateway.clone(), gateway.clone(), store)?;
        Ok(Self::new(agent, db, gateway, server.rate_limit.as_ref()))
    }
}

/// Spread `requests` evenly over the period, allowing a full burst.
fn build_rate_limiter(config: &RateLimitConfig) -> Option<Arc<GlobalRateLimiter>> {
    let burst = NonZeroU32::new(config.requests)?;
    let quota = Quota::with_period(config.period / config.requests)?.allow_burst(burst);
    Some(Arc::new(RateLimiter::direct(quota)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_rate_limiter_allows_burst_then_rejects() {
        let limiter = build_rate_limiter(&RateLimitConfig {
            requests: 2,
            period: Duration::from_secs(3600),
        })
        .unwrap();
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }

    #[test]
    fn test_zero_requests_disables_limiter() {
        let limiter = build_rate_limiter(&RateLimitConfig {
            requests: 0,
            period: Duration::from_secs(60),
        });
        assert!(limiter.is_none());
    }
}
