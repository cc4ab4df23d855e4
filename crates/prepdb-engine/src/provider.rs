//! EngineProvider: The engine layer behind the provider traits.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use prepdb_core::constants::DEFAULT_LAUNCH_ATTEMPTS;
use prepdb_core::errors::ProviderError;
use prepdb_core::{
    CompositePreparer, Database, DatabaseProvider, DatabaseRequest, DatabaseTemplate,
    ProviderIdentity, TemplatableProvider,
};

use crate::cache::EngineInstanceCache;
use crate::config::EngineConfig;
use crate::instance::EngineInstance;

const RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Provisions databases directly on the engine instance for one config,
/// launching it on first use.
///
/// Transient launch failures are retried here, up to `launch_attempts`
/// attempts in total.
pub struct EngineProvider {
    config: EngineConfig,
    identity: ProviderIdentity,
    instances: Arc<EngineInstanceCache>,
    launch_attempts: u32,
}

impl EngineProvider {
    pub fn new(config: EngineConfig, instances: Arc<EngineInstanceCache>) -> Self {
        let identity = config.identity();
        Self {
            config,
            identity,
            instances,
            launch_attempts: DEFAULT_LAUNCH_ATTEMPTS,
        }
    }

    pub fn with_launch_attempts(mut self, attempts: u32) -> Self {
        self.launch_attempts = attempts.max(1);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The running engine instance, launching it if needed.
    pub fn instance(&self) -> Result<Arc<EngineInstance>, ProviderError> {
        let mut attempt = 1;
        loop {
            match self.instances.get_or_launch(&self.config) {
                Ok(instance) => return Ok(instance),
                Err(e) if e.is_transient() && attempt < self.launch_attempts => {
                    warn!(
                        identity = %self.identity,
                        attempt,
                        max_attempts = self.launch_attempts,
                        error = %e,
                        "transient engine launch failure, retrying"
                    );
                    std::thread::sleep(RETRY_BACKOFF * attempt);
                    attempt += 1;
                }
                Err(e) => return Err(ProviderError::Engine(e)),
            }
        }
    }
}

impl DatabaseProvider for EngineProvider {
    fn identity(&self) -> ProviderIdentity {
        self.identity.clone()
    }

    fn create_database(&self, preparer: &CompositePreparer) -> Result<Database, ProviderError> {
        self.create_database_from(DatabaseRequest::fresh(preparer.clone()))
    }
}

impl TemplatableProvider for EngineProvider {
    fn create_database_from(&self, request: DatabaseRequest) -> Result<Database, ProviderError> {
        self.instance()?.create_database(&request)
    }

    fn create_template(&self, request: DatabaseRequest) -> Result<DatabaseTemplate, ProviderError> {
        self.instance()?.create_template(&request)
    }
}

impl std::fmt::Debug for EngineProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineProvider")
            .field("identity", &self.identity)
            .field("launch_attempts", &self.launch_attempts)
            .finish()
    }
}
