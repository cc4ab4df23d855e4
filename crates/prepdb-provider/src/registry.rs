//! ProviderRegistry: Provider types by name, and stack composition.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use prepdb_core::errors::{ProviderError, RegistryError};
use prepdb_core::{
    CompositePreparer, Database, DatabaseProvider, PrepdbConfig, ProviderIdentity,
    TemplatableProvider,
};
use prepdb_engine::{EngineConfig, EngineInstanceCache, EngineProvider};

use crate::prefetching::PrefetchingProvider;
use crate::setup::SetupPhase;
use crate::template_cache::TemplateCache;
use crate::templating::TemplatingProvider;

/// An optional runtime dependency that could not be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyMissing {
    pub dependency: String,
    pub hint: String,
}

impl DependencyMissing {
    pub fn new(dependency: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            dependency: dependency.into(),
            hint: hint.into(),
        }
    }
}

type DependencyProbe = Arc<dyn Fn() -> Result<(), DependencyMissing> + Send + Sync>;
type ProviderFactory = Arc<
    dyn Fn(&PrepdbConfig, &Arc<EngineInstanceCache>) -> Result<Arc<dyn TemplatableProvider>, ProviderError>
        + Send
        + Sync,
>;

/// One provider type: its name, the dependency check run before building,
/// and the factory for the engine-level provider.
#[derive(Clone)]
pub struct ProviderRegistration {
    name: String,
    probe: Option<DependencyProbe>,
    factory: ProviderFactory,
}

impl ProviderRegistration {
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&PrepdbConfig, &Arc<EngineInstanceCache>) -> Result<Arc<dyn TemplatableProvider>, ProviderError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            probe: None,
            factory: Arc::new(factory),
        }
    }

    pub fn with_probe<P>(mut self, probe: P) -> Self
    where
        P: Fn() -> Result<(), DependencyMissing> + Send + Sync + 'static,
    {
        self.probe = Some(Arc::new(probe));
        self
    }

    /// The bundled SQLite engine. Needs no external dependency.
    pub fn sqlite() -> Self {
        Self::new("sqlite", |config, engines| {
            let engine = EngineConfig::from_settings(&config.engine).build();
            let provider = EngineProvider::new(engine, Arc::clone(engines))
                .with_launch_attempts(config.engine.effective_launch_attempts());
            Ok(Arc::new(provider) as Arc<dyn TemplatableProvider>)
        })
    }

    /// SQLite with its cluster directory under `dir`. Resolving it fails
    /// with a missing dependency when `dir` is not a writable directory.
    pub fn sqlite_in(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let probed = dir.clone();
        Self::new(name, move |config, engines| {
            let engine = EngineConfig::from_settings(&config.engine)
                .base_dir(dir.clone())
                .build();
            let provider = EngineProvider::new(engine, Arc::clone(engines))
                .with_launch_attempts(config.engine.effective_launch_attempts());
            Ok(Arc::new(provider) as Arc<dyn TemplatableProvider>)
        })
        .with_probe(move || writable_dir(&probed))
    }

    /// SQLite on the RAM-backed `/dev/shm` mount.
    pub fn sqlite_shm() -> Self {
        Self::sqlite_in("sqlite-shm", SHM_DIR)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

const SHM_DIR: &str = "/dev/shm";

fn writable_dir(dir: &std::path::Path) -> Result<(), DependencyMissing> {
    let hint = |problem: &str| {
        DependencyMissing::new(
            dir.display().to_string(),
            format!("{problem}; mount or create it, or use the `sqlite` provider"),
        )
    };
    match std::fs::metadata(dir) {
        Ok(meta) if !meta.is_dir() => Err(hint("not a directory")),
        Ok(meta) if meta.permissions().readonly() => Err(hint("directory is read-only")),
        Ok(_) => Ok(()),
        Err(_) => Err(hint("directory does not exist")),
    }
}

impl fmt::Debug for ProviderRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistration")
            .field("name", &self.name)
            .field("probe", &self.probe.is_some())
            .finish()
    }
}

/// Registered provider types plus the process-wide caches every provider
/// built from this registry shares.
pub struct ProviderRegistry {
    registrations: BTreeMap<String, ProviderRegistration>,
    engines: Arc<EngineInstanceCache>,
    templates: Arc<TemplateCache>,
}

impl ProviderRegistry {
    /// An empty registry with fresh caches.
    pub fn new() -> Self {
        Self {
            registrations: BTreeMap::new(),
            engines: Arc::new(EngineInstanceCache::sqlite()),
            templates: Arc::new(TemplateCache::new()),
        }
    }

    /// A registry with the built-in provider types.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(ProviderRegistration::sqlite());
        registry.register(ProviderRegistration::sqlite_shm());
        registry
    }

    /// Use `engines` instead of the registry's own engine instance cache.
    pub fn with_engines(mut self, engines: Arc<EngineInstanceCache>) -> Self {
        self.engines = engines;
        self
    }

    /// Add or replace a provider type.
    pub fn register(&mut self, registration: ProviderRegistration) {
        self.registrations
            .insert(registration.name.clone(), registration);
    }

    pub fn names(&self) -> Vec<&str> {
        self.registrations.keys().map(String::as_str).collect()
    }

    pub fn engines(&self) -> &Arc<EngineInstanceCache> {
        &self.engines
    }

    pub fn templates(&self) -> &Arc<TemplateCache> {
        &self.templates
    }

    /// Look up `name` and check its dependency.
    pub fn resolve(&self, name: &str) -> Result<&ProviderRegistration, RegistryError> {
        let registration =
            self.registrations
                .get(name)
                .ok_or_else(|| RegistryError::MissingProvider {
                    provider: name.to_string(),
                    known: self.names().join(", "),
                })?;
        if let Some(probe) = &registration.probe {
            probe().map_err(|missing| RegistryError::MissingDependency {
                provider: name.to_string(),
                dependency: missing.dependency,
                hint: missing.hint,
            })?;
        }
        Ok(registration)
    }

    /// The engine-level provider for `name`, without templating or
    /// prefetching.
    pub fn engine_provider(
        &self,
        name: &str,
        config: &PrepdbConfig,
    ) -> Result<Arc<dyn TemplatableProvider>, RegistryError> {
        let registration = self.resolve(name)?;
        (registration.factory)(config, &self.engines).map_err(|source| RegistryError::Build {
            provider: name.to_string(),
            source,
        })
    }

    /// Compose the full stack for `name`:
    /// prefetching over templating (when enabled) over the engine provider.
    pub fn build(
        &self,
        name: &str,
        config: &PrepdbConfig,
        setup_phase: SetupPhase,
    ) -> Result<PrefetchingProvider, RegistryError> {
        let engine = self.engine_provider(name, config)?;
        let templating = config.templating.effective_enabled();
        let inner: Arc<dyn DatabaseProvider> = if templating {
            Arc::new(
                TemplatingProvider::new(engine, Arc::clone(&self.templates))
                    .with_setup_phase(setup_phase),
            )
        } else {
            as_database_provider(engine)
        };
        let provider =
            PrefetchingProvider::new(inner, &config.prefetch).map_err(|source| {
                RegistryError::Build {
                    provider: name.to_string(),
                    source,
                }
            })?;
        info!(
            provider = name,
            templating,
            threads = config.prefetch.effective_thread_pool_size(),
            buffer = config.prefetch.effective_pipeline_cache_size(),
            "provider stack built"
        );
        Ok(provider)
    }

    /// [`build`](Self::build) for the engine named in `config`.
    pub fn build_default(
        &self,
        config: &PrepdbConfig,
        setup_phase: SetupPhase,
    ) -> Result<PrefetchingProvider, RegistryError> {
        self.build(config.engine.effective_engine(), config, setup_phase)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

/// Forwards the consumer-facing half of a templatable provider.
struct EngineOnly(Arc<dyn TemplatableProvider>);

impl DatabaseProvider for EngineOnly {
    fn identity(&self) -> ProviderIdentity {
        self.0.identity()
    }

    fn create_database(&self, preparer: &CompositePreparer) -> Result<Database, ProviderError> {
        self.0.create_database(preparer)
    }
}

fn as_database_provider(provider: Arc<dyn TemplatableProvider>) -> Arc<dyn DatabaseProvider> {
    Arc::new(EngineOnly(provider))
}
