//! Engine launchers: turn an `EngineConfig` into a running backend.

use std::sync::Arc;

use prepdb_core::errors::EngineError;

use crate::backend::{EngineBackend, SqliteBackend};
use crate::config::EngineConfig;

/// Starts engines. Called at most once per distinct config by the
/// instance cache; retries happen in the provider, not here.
pub trait EngineLauncher: Send + Sync {
    fn launch(&self, config: &EngineConfig) -> Result<Arc<dyn EngineBackend>, EngineError>;
}

/// Launches the bundled SQLite engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteLauncher;

impl EngineLauncher for SqliteLauncher {
    fn launch(&self, config: &EngineConfig) -> Result<Arc<dyn EngineBackend>, EngineError> {
        if config.engine() != "sqlite" {
            return Err(EngineError::UnsupportedEngine(config.engine().to_string()));
        }
        Ok(Arc::new(SqliteBackend::start(config)?))
    }
}
