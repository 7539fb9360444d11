//! Repository configuration loaded from TOML with environment overrides.
//!
//! Precedence: env > config file > defaults.

use crate::errors::DbError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: Option<PathBuf>,
    pub level: Option<String>,
    pub retention: Option<usize>,
    pub dev6: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Reuse compiled method signatures across invocations.
    pub cache_compiled_queries: bool,
    pub compiled_cache_capacity: usize,
    /// Upper bound on values bound to a single `In`/`NotIn` clause.
    pub max_in_set: usize,
    /// Hard cap on documents materialized by one list query.
    pub max_result_limit: usize,
    pub slow_query_ms: u64,
    pub logging: LoggingConfig,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            cache_compiled_queries: true,
            compiled_cache_capacity: crate::query::QueryCache::DEFAULT_CAPACITY,
            max_in_set: 1000,
            max_result_limit: 10_000,
            slow_query_ms: 500,
            logging: LoggingConfig::default(),
        }
    }
}

impl RepositoryConfig {
    /// # Errors
    /// Returns `DbError::Config` on malformed TOML or out-of-range values.
    pub fn from_toml_str(s: &str) -> Result<Self, DbError> {
        let cfg: Self = toml::from_str(s).map_err(|e| DbError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// # Errors
    /// Returns an error if the file cannot be read or does not parse.
    pub fn load(path: &Path) -> Result<Self, DbError> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    /// Apply `NEXUSREPO_*` environment overrides on top of this config.
    ///
    /// # Errors
    /// Returns `DbError::Config` when an override is not parseable.
    pub fn with_env_overrides(mut self) -> Result<Self, DbError> {
        if let Ok(s) = std::env::var("NEXUSREPO_SLOW_QUERY_MS") {
            self.slow_query_ms = s
                .parse()
                .map_err(|_| DbError::Config(format!("NEXUSREPO_SLOW_QUERY_MS: `{s}`")))?;
        }
        if let Ok(s) = std::env::var("NEXUSREPO_CACHE") {
            self.cache_compiled_queries =
                matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        if let Ok(s) = std::env::var("NEXUSREPO_MAX_RESULT_LIMIT") {
            self.max_result_limit = s
                .parse()
                .map_err(|_| DbError::Config(format!("NEXUSREPO_MAX_RESULT_LIMIT: `{s}`")))?;
        }
        self.validate()?;
        Ok(self)
    }

    /// # Errors
    /// Returns `DbError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<(), DbError> {
        if self.compiled_cache_capacity == 0 {
            return Err(DbError::Config("compiled_cache_capacity must be > 0".into()));
        }
        if self.max_in_set == 0 {
            return Err(DbError::Config("max_in_set must be > 0".into()));
        }
        if self.max_result_limit == 0 {
            return Err(DbError::Config("max_result_limit must be > 0".into()));
        }
        Ok(())
    }
}
