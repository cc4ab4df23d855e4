//! Top-level prepdb configuration with layered resolution.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{EngineSettings, PrefetchConfig, TemplatingConfig};
use crate::errors::ConfigError;

/// Top-level configuration aggregating all sub-configs.
///
/// Resolution order (highest priority first):
/// 1. Environment variables (`PREPDB_*`)
/// 2. Config file (`prepdb.toml`)
/// 3. Compiled defaults
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct PrepdbConfig {
    pub engine: EngineSettings,
    pub prefetch: PrefetchConfig,
    pub templating: TemplatingConfig,
}

impl PrepdbConfig {
    /// Load configuration from `path` (if it exists), then apply environment
    /// overrides and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotReadable {
                    path: path.display().to_string(),
                })?;
            toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: e.to_string(),
            })?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (no env overrides).
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str).map_err(|e| ConfigError::ParseError {
            path: "<string>".to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.max_connections == Some(0) {
            return Err(ConfigError::ValidationFailed {
                field: "engine.max_connections".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if self.engine.launch_attempts == Some(0) {
            return Err(ConfigError::ValidationFailed {
                field: "engine.launch_attempts".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if self.prefetch.thread_pool_size == Some(0) {
            return Err(ConfigError::ValidationFailed {
                field: "prefetch.thread_pool_size".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    /// Apply environment variable overrides.
    /// Pattern: `PREPDB_MAX_CONNECTIONS`, `PREPDB_PREFETCH_THREADS`, etc.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("PREPDB_MAX_CONNECTIONS") {
            if let Ok(v) = val.parse::<usize>() {
                self.engine.max_connections = Some(v);
            }
        }
        if let Ok(val) = std::env::var("PREPDB_PREFETCH_THREADS") {
            if let Ok(v) = val.parse::<usize>() {
                self.prefetch.thread_pool_size = Some(v);
            }
        }
        if let Ok(val) = std::env::var("PREPDB_PIPELINE_CACHE_SIZE") {
            if let Ok(v) = val.parse::<usize>() {
                self.prefetch.pipeline_cache_size = Some(v);
            }
        }
        if let Ok(val) = std::env::var("PREPDB_KEEP_DATA") {
            if let Ok(v) = val.parse::<bool>() {
                self.engine.keep_data = Some(v);
            }
        }
    }

    /// Serialize the config back to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError {
            path: "<serialization>".to_string(),
            message: e.to_string(),
        })
    }
}
