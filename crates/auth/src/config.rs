//! Engine configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_MAX_DEPTH: &str = "IDGOV_AUTHZ_MAX_DEPTH";
pub const ENV_CACHE: &str = "IDGOV_AUTHZ_CACHE";
pub const ENV_CACHE_CAPACITY: &str = "IDGOV_AUTHZ_CACHE_CAPACITY";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid value for {var}: '{value}'")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizationConfig {
    /// Maximum nesting of evaluators calling back into the manager
    /// (transitive owners, delegation counter-parties).
    pub max_depth: usize,
    /// Cache object decisions per principal.
    pub cache_enabled: bool,
    pub cache_capacity: usize,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            max_depth: 8,
            cache_enabled: false,
            cache_capacity: 10_000,
        }
    }
}

impl AuthorizationConfig {
    /// Defaults overridden by `IDGOV_AUTHZ_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(value) = lookup(ENV_MAX_DEPTH) {
            config.max_depth = parse(ENV_MAX_DEPTH, &value)?;
        }
        if let Some(value) = lookup(ENV_CACHE) {
            config.cache_enabled = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError {
                        var: ENV_CACHE,
                        value,
                    });
                }
            };
        }
        if let Some(value) = lookup(ENV_CACHE_CAPACITY) {
            config.cache_capacity = parse(ENV_CACHE_CAPACITY, &value)?;
        }
        Ok(config)
    }
}

fn parse(var: &'static str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError {
        var,
        value: value.to_string(),
    })
}
