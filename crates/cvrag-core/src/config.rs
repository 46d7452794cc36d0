//! Agent configuration.
//!
//! An [`AgentConfig`] is built once (per process or per request) from
//! [`crate::defaults`], optionally overridden through the builder methods or
//! environment variables, and never mutated afterwards.
//!
//! | Variable | Default | Field |
//! |----------|---------|-------|
//! | `CHAT_MODEL` | gpt-4o-mini | `chat_model` |
//! | `EMBEDDING_MODEL` | text-embedding-3-small | `embed_model` |
//! | `AGENT_MAX_STEPS` | 5 | `max_steps` |
//! | `SEARCH_LIMIT` | 5 | `search_limit` |
//! | `SIMILARITY_THRESHOLD` | 0.3 | `similarity_threshold` |
//! | `AGENT_TIMEOUT_MS` | 30000 | `timeout_ms` |

use std::time::Duration;

use tracing::debug;

use crate::defaults;
use crate::error::{Error, Result};

/// Immutable settings for one agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// Chat model identifier at the gateway.
    pub chat_model: String,
    /// Embedding model identifier at the gateway.
    pub embed_model: String,
    /// Maximum model calls per turn; the last one is made without tools.
    pub max_steps: usize,
    /// Result count used when the model omits `maxResults`.
    pub search_limit: i64,
    /// Minimum similarity for a chunk to be returned.
    pub similarity_threshold: f32,
    /// Wall-clock budget for a whole turn.
    pub timeout_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            chat_model: defaults::CHAT_MODEL.to_string(),
            embed_model: defaults::EMBED_MODEL.to_string(),
            max_steps: defaults::MAX_STEPS,
            search_limit: defaults::SEARCH_LIMIT,
            similarity_threshold: defaults::SIMILARITY_THRESHOLD,
            timeout_ms: defaults::TIMEOUT_MS,
        }
    }
}

impl AgentConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load defaults overridden by environment variables.
    ///
    /// Unparseable numeric values are a configuration error rather than
    /// being silently replaced by the default.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(model) = env_string("CHAT_MODEL") {
            config.chat_model = model;
        }
        if let Some(model) = env_string("EMBEDDING_MODEL") {
            config.embed_model = model;
        }
        if let Some(steps) = env_parse("AGENT_MAX_STEPS")? {
            config.max_steps = steps;
        }
        if let Some(limit) = env_parse("SEARCH_LIMIT")? {
            config.search_limit = limit;
        }
        if let Some(threshold) = env_parse("SIMILARITY_THRESHOLD")? {
            config.similarity_threshold = threshold;
        }
        if let Some(timeout) = env_parse("AGENT_TIMEOUT_MS")? {
            config.timeout_ms = timeout;
        }

        config.validate()?;

        debug!(
            subsystem = "agent",
            component = "config",
            chat_model = %config.chat_model,
            embed_model = %config.embed_model,
            max_steps = config.max_steps,
            search_limit = config.search_limit,
            threshold = config.similarity_threshold,
            timeout_ms = config.timeout_ms,
            "Agent configuration loaded"
        );
        Ok(config)
    }

    /// Set the chat model.
    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    /// Set the embedding model.
    pub fn with_embed_model(mut self, model: impl Into<String>) -> Self {
        self.embed_model = model.into();
        self
    }

    /// Set the maximum number of model calls per turn.
    pub fn with_max_steps(mut self, steps: usize) -> Self {
        self.max_steps = steps;
        self
    }

    /// Set the default search result count.
    pub fn with_search_limit(mut self, limit: i64) -> Self {
        self.search_limit = limit;
        self
    }

    /// Set the similarity threshold.
    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Set the request timeout in milliseconds.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.chat_model.trim().is_empty() {
            return Err(Error::Config("chat_model cannot be empty".to_string()));
        }
        if self.embed_model.trim().is_empty() {
            return Err(Error::Config("embed_model cannot be empty".to_string()));
        }
        if self.max_steps == 0 {
            return Err(Error::Config("max_steps must be at least 1".to_string()));
        }
        if !(defaults::SEARCH_LIMIT_MIN..=defaults::SEARCH_LIMIT_MAX).contains(&self.search_limit) {
            return Err(Error::Config(format!(
                "search_limit must be between {} and {}, got {}",
                defaults::SEARCH_LIMIT_MIN,
                defaults::SEARCH_LIMIT_MAX,
                self.search_limit
            )));
        }
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            return Err(Error::Config(format!(
                "similarity_threshold must be within [-1, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.timeout_ms == 0 {
            return Err(Error::Config("timeout_ms must be positive".to_string()));
        }
        Ok(())
    }
}

/// Trimmed, non-empty value of an environment variable.
pub fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse an optional environment variable; a present but invalid value is an error.
pub fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{} has invalid value {:?}: {}", key, raw, e))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AgentConfig::default();
        assert_eq!(config.chat_model, defaults::CHAT_MODEL);
        assert_eq!(config.embed_model, defaults::EMBED_MODEL);
        assert_eq!(config.max_steps, 5);
        assert_eq!(config.search_limit, 5);
        assert_eq!(config.similarity_threshold, 0.3);
        assert_eq!(config.timeout_ms, 30_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_overrides() {
        let config = AgentConfig::new()
            .with_chat_model("gpt-4.1")
            .with_embed_model("text-embedding-3-large")
            .with_max_steps(3)
            .with_search_limit(8)
            .with_similarity_threshold(0.5)
            .with_timeout_ms(1_000);

        assert_eq!(config.chat_model, "gpt-4.1");
        assert_eq!(config.embed_model, "text-embedding-3-large");
        assert_eq!(config.max_steps, 3);
        assert_eq!(config.search_limit, 8);
        assert_eq!(config.similarity_threshold, 0.5);
        assert_eq!(config.timeout(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_steps() {
        let err = AgentConfig::new().with_max_steps(0).validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validate_rejects_search_limit_out_of_range() {
        assert!(AgentConfig::new().with_search_limit(0).validate().is_err());
        assert!(AgentConfig::new().with_search_limit(11).validate().is_err());
        assert!(AgentConfig::new().with_search_limit(10).validate().is_ok());
        assert!(AgentConfig::new().with_search_limit(1).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        assert!(AgentConfig::new()
            .with_similarity_threshold(1.5)
            .validate()
            .is_err());
        assert!(AgentConfig::new()
            .with_similarity_threshold(f32::NAN)
            .validate()
            .is_err());
    }

    #[test]
    fn test_validate_rejects_empty_model_and_zero_timeout() {
        assert!(AgentConfig::new().with_chat_model("  ").validate().is_err());
        assert!(AgentConfig::new().with_embed_model("").validate().is_err());
        assert!(AgentConfig::new().with_timeout_ms(0).validate().is_err());
    }
}
