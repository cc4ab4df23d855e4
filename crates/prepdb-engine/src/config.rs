//! EngineConfig: The immutable value an engine instance is keyed by.
//!
//! Two equal configs always map to the same running engine. Parameter maps
//! are ordered so equality and hashing are independent of insertion order.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::Connection;

use prepdb_core::config::EngineSettings;
use prepdb_core::constants::DEFAULT_MAX_CONNECTIONS;
use prepdb_core::errors::PreparationError;
use prepdb_core::ProviderIdentity;

type CustomizerFn = dyn Fn(&Connection) -> Result<(), PreparationError> + Send + Sync;

/// A hook run on every new blank database before preparation.
///
/// Customizers compare by allocation identity: clones of one customizer are
/// equal, two customizers built from identical closures are not.
#[derive(Clone)]
pub struct Customizer {
    label: String,
    hook: Arc<CustomizerFn>,
}

impl Customizer {
    pub fn new<F>(label: impl Into<String>, hook: F) -> Self
    where
        F: Fn(&Connection) -> Result<(), PreparationError> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            hook: Arc::new(hook),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn apply(&self, conn: &Connection) -> Result<(), PreparationError> {
        (self.hook)(conn)
    }

    fn address(&self) -> usize {
        Arc::as_ptr(&self.hook) as *const () as usize
    }
}

impl PartialEq for Customizer {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}

impl Eq for Customizer {}

impl Hash for Customizer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address().hash(state);
    }
}

impl fmt::Debug for Customizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Customizer")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EngineConfig {
    engine: String,
    min_version: Option<String>,
    init_params: BTreeMap<String, String>,
    server_params: BTreeMap<String, String>,
    client_params: BTreeMap<String, String>,
    max_connections: usize,
    keep_data: bool,
    base_dir: Option<PathBuf>,
    customizers: Vec<Customizer>,
}

impl EngineConfig {
    pub fn builder(engine: impl Into<String>) -> EngineConfigBuilder {
        EngineConfigBuilder {
            config: EngineConfig {
                engine: engine.into(),
                min_version: None,
                init_params: BTreeMap::new(),
                server_params: BTreeMap::new(),
                client_params: BTreeMap::new(),
                max_connections: DEFAULT_MAX_CONNECTIONS,
                keep_data: false,
                base_dir: None,
                customizers: Vec::new(),
            },
        }
    }

    /// A default SQLite engine configuration.
    pub fn sqlite() -> Self {
        Self::builder("sqlite").build()
    }

    /// Builder seeded from the `[engine]` section of a `PrepdbConfig`.
    pub fn from_settings(settings: &EngineSettings) -> EngineConfigBuilder {
        let mut builder = Self::builder(settings.effective_engine())
            .max_connections(settings.effective_max_connections())
            .keep_data(settings.effective_keep_data());
        if let Some(version) = &settings.min_version {
            builder = builder.min_version(version.clone());
        }
        builder.config.init_params = settings.init_params.clone();
        builder.config.server_params = settings.server_params.clone();
        builder.config.client_params = settings.client_params.clone();
        builder
    }

    pub fn engine(&self) -> &str {
        &self.engine
    }

    pub fn min_version(&self) -> Option<&str> {
        self.min_version.as_deref()
    }

    pub fn init_params(&self) -> &BTreeMap<String, String> {
        &self.init_params
    }

    pub fn server_params(&self) -> &BTreeMap<String, String> {
        &self.server_params
    }

    pub fn client_params(&self) -> &BTreeMap<String, String> {
        &self.client_params
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn keep_data(&self) -> bool {
        self.keep_data
    }

    /// Parent directory for the engine's cluster directory. `None` uses the
    /// system temp dir.
    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    pub fn customizers(&self) -> &[Customizer] {
        &self.customizers
    }

    /// Stable provider identity derived from this value.
    ///
    /// Equal configs yield equal identities within one process. Customizers
    /// contribute their allocation identity, so the result is not stable
    /// across processes when customizers are present.
    pub fn identity(&self) -> ProviderIdentity {
        let mut hasher = blake3::Hasher::new();
        field(&mut hasher, "engine", &self.engine);
        field(&mut hasher, "min_version", self.min_version.as_deref().unwrap_or(""));
        params(&mut hasher, "init", &self.init_params);
        params(&mut hasher, "server", &self.server_params);
        params(&mut hasher, "client", &self.client_params);
        field(&mut hasher, "max_connections", &self.max_connections.to_string());
        field(&mut hasher, "keep_data", if self.keep_data { "1" } else { "0" });
        if let Some(dir) = &self.base_dir {
            field(&mut hasher, "base_dir", &dir.to_string_lossy());
        }
        for customizer in &self.customizers {
            field(&mut hasher, "customizer", &customizer.address().to_string());
        }
        let hex = hasher.finalize().to_hex();
        ProviderIdentity::new(format!("{}:{}", self.engine, &hex.as_str()[..16]))
    }
}

fn field(hasher: &mut blake3::Hasher, name: &str, value: &str) {
    hasher.update(name.as_bytes());
    hasher.update(&[0]);
    hasher.update(value.as_bytes());
    hasher.update(&[0]);
}

fn params(hasher: &mut blake3::Hasher, section: &str, map: &BTreeMap<String, String>) {
    for (key, value) in map {
        field(hasher, &format!("{section}.{key}"), value);
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn min_version(mut self, version: impl Into<String>) -> Self {
        self.config.min_version = Some(version.into());
        self
    }

    pub fn init_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.init_params.insert(key.into(), value.into());
        self
    }

    pub fn server_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.server_params.insert(key.into(), value.into());
        self
    }

    pub fn client_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.client_params.insert(key.into(), value.into());
        self
    }

    pub fn max_connections(mut self, max: usize) -> Self {
        self.config.max_connections = max;
        self
    }

    pub fn keep_data(mut self, keep: bool) -> Self {
        self.config.keep_data = keep;
        self
    }

    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.base_dir = Some(dir.into());
        self
    }

    pub fn customizer(mut self, customizer: Customizer) -> Self {
        self.config.customizers.push(customizer);
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}
