//! EngineInstanceCache: Memoized engine launches, one per distinct config.

use std::sync::Arc;

use moka::sync::Cache;
use tracing::{debug, info};

use prepdb_core::errors::EngineError;

use crate::config::EngineConfig;
use crate::instance::EngineInstance;
use crate::launcher::{EngineLauncher, SqliteLauncher};

/// Process-wide map from engine config to running instance.
///
/// Concurrent first access for one config launches once; every waiter
/// receives that launch's result. Failed launches are not cached. Entries
/// never expire, so an instance lives as long as the cache.
pub struct EngineInstanceCache {
    launcher: Arc<dyn EngineLauncher>,
    instances: Cache<EngineConfig, Arc<EngineInstance>>,
}

impl EngineInstanceCache {
    pub fn new(launcher: Arc<dyn EngineLauncher>) -> Self {
        Self {
            launcher,
            instances: Cache::builder().build(),
        }
    }

    /// Cache launching the bundled SQLite engine.
    pub fn sqlite() -> Self {
        Self::new(Arc::new(SqliteLauncher))
    }

    pub fn get_or_launch(
        &self,
        config: &EngineConfig,
    ) -> Result<Arc<EngineInstance>, Arc<EngineError>> {
        if let Some(instance) = self.instances.get(config) {
            debug!(identity = %config.identity(), "engine instance cache hit");
            return Ok(instance);
        }
        self.instances.try_get_with(config.clone(), || {
            info!(
                engine = config.engine(),
                identity = %config.identity(),
                "launching engine instance"
            );
            let backend = self.launcher.launch(config)?;
            Ok::<_, EngineError>(Arc::new(EngineInstance::new(config.clone(), backend)))
        })
    }

    /// Number of running instances.
    pub fn len(&self) -> u64 {
        self.instances.run_pending_tasks();
        self.instances.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EngineInstanceCache {
    fn default() -> Self {
        Self::sqlite()
    }
}

impl std::fmt::Debug for EngineInstanceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineInstanceCache")
            .field("instances", &self.instances.entry_count())
            .finish()
    }
}
