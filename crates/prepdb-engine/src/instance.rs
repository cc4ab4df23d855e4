//! EngineInstance: One running engine and the databases it provisions.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use rusqlite::Connection;
use tracing::{debug, warn};

use prepdb_core::database::{AdmissionSemaphore, ConnectionSource, Database};
use prepdb_core::errors::{EngineError, ProviderError};
use prepdb_core::request::{DatabaseRequest, DatabaseTemplate};

use crate::backend::EngineBackend;
use crate::config::EngineConfig;
use crate::names;

/// Exposes a backend as the connection source of the handles it issues.
struct BackendConnections(Arc<dyn EngineBackend>);

impl ConnectionSource for BackendConnections {
    fn open(&self, database: &str) -> Result<Connection, EngineError> {
        self.0.open(database)
    }

    fn location(&self, database: &str) -> Option<PathBuf> {
        self.0.location(database)
    }
}

/// A launched engine plus the admission semaphore shared by every handle
/// it issues.
///
/// Databases are created blank or cloned from a template, then prepared.
/// Creation, cloning and preparation each hold an admission permit while
/// they run. If any of that fails, the partial database is dropped on a
/// background thread and the original error is returned.
pub struct EngineInstance {
    config: EngineConfig,
    backend: Arc<dyn EngineBackend>,
    connections: Arc<dyn ConnectionSource>,
    admission: Arc<AdmissionSemaphore>,
}

impl EngineInstance {
    pub fn new(config: EngineConfig, backend: Arc<dyn EngineBackend>) -> Self {
        let admission = AdmissionSemaphore::new(config.max_connections());
        let connections: Arc<dyn ConnectionSource> =
            Arc::new(BackendConnections(Arc::clone(&backend)));
        Self {
            config,
            backend,
            connections,
            admission,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn EngineBackend> {
        &self.backend
    }

    pub fn admission(&self) -> &Arc<AdmissionSemaphore> {
        &self.admission
    }

    /// Create a database for `request` and hand it to the caller. Closing
    /// the handle drops the database.
    pub fn create_database(&self, request: &DatabaseRequest) -> Result<Database, ProviderError> {
        let name = self.provision(request)?;
        let backend = Arc::clone(&self.backend);
        Ok(self.handle(name).with_release(move |name| {
            if let Err(e) = backend.drop_database(name) {
                warn!(database = name, error = %e, "failed to drop released database");
            }
        }))
    }

    /// Create a database for `request` and expose it as a template. Closing
    /// the template drops it.
    pub fn create_template(
        &self,
        request: &DatabaseRequest,
    ) -> Result<DatabaseTemplate, ProviderError> {
        let name = self.provision(request)?;
        let backend = Arc::clone(&self.backend);
        Ok(DatabaseTemplate::with_close(name, move |name| {
            if let Err(e) = backend.drop_database(name) {
                warn!(template = name, error = %e, "failed to drop retired template");
            }
        }))
    }

    fn handle(&self, name: String) -> Database {
        Database::new(name, Arc::clone(&self.connections), Arc::clone(&self.admission))
            .with_client_params(
                self.config
                    .client_params()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            )
    }

    fn provision(&self, request: &DatabaseRequest) -> Result<String, ProviderError> {
        let started = Instant::now();
        let name = names::database_name();
        let template = request.template().map(|t| t.name().to_string());

        let created = self.admission.acquire().and_then(|_permit| match &template {
            Some(template) => self.backend.clone_database(template, &name),
            None => self.backend.create_blank(&name),
        });
        if let Err(source) = created {
            self.drop_in_background(name.clone());
            return Err(ProviderError::Creation {
                database: name,
                source,
            });
        }

        if let Err(e) = self.prepare(&name, request) {
            self.drop_in_background(name);
            return Err(e);
        }

        debug!(
            database = %name,
            template = template.as_deref().unwrap_or("-"),
            steps = request.preparer().map_or(0, |p| p.len()),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "database provisioned"
        );
        Ok(name)
    }

    fn prepare(&self, name: &str, request: &DatabaseRequest) -> Result<(), ProviderError> {
        let customize = request.template().is_none() && !self.config.customizers().is_empty();
        if !customize && !request.has_pending_steps() {
            return Ok(());
        }

        let creation = |source: EngineError| ProviderError::Creation {
            database: name.to_string(),
            source,
        };
        // Preparation connections count against the engine's admission limit.
        let scratch = Database::new(name, Arc::clone(&self.connections), Arc::clone(&self.admission));
        let conn = scratch.connection().map_err(creation)?;

        if customize {
            for customizer in self.config.customizers() {
                customizer.apply(&conn).map_err(|source| {
                    creation(EngineError::Customizer {
                        customizer: customizer.label().to_string(),
                        source,
                    })
                })?;
            }
        }
        if let Some(preparer) = request.preparer() {
            preparer
                .apply(&conn)
                .map_err(|source| ProviderError::Preparation {
                    database: name.to_string(),
                    source,
                })?;
        }
        conn.close().map_err(creation)
    }

    /// Best-effort drop of a partially created database. Failures are logged.
    fn drop_in_background(&self, name: String) {
        let backend = Arc::clone(&self.backend);
        debug!(database = %name, "scheduling drop of partial database");
        rayon::spawn(move || match backend.drop_database(&name) {
            Ok(()) => debug!(database = %name, "partial database dropped"),
            Err(e) => warn!(database = %name, error = %e, "failed to drop partial database"),
        });
    }
}

impl std::fmt::Debug for EngineInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineInstance")
            .field("engine", &self.config.engine())
            .field("version", &self.backend.version())
            .field("available_permits", &self.admission.available())
            .finish()
    }
}
