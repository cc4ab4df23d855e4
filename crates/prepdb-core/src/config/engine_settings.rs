//! Engine instance configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_LAUNCH_ATTEMPTS, DEFAULT_MAX_CONNECTIONS};

/// Settings for the database engine instances backing the providers.
///
/// The parameter maps are opaque key/value passthroughs:
/// - `init_params` are applied once when a blank database is created,
/// - `server_params` are applied on every opened connection,
/// - `client_params` are appended to the connection URI handed to consumers.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct EngineSettings {
    /// Engine type name. Default: "sqlite".
    pub engine: Option<String>,
    /// Minimum engine version accepted at launch.
    pub min_version: Option<String>,
    /// Maximum concurrently open connections per engine instance. Default: 300.
    pub max_connections: Option<usize>,
    pub init_params: BTreeMap<String, String>,
    pub server_params: BTreeMap<String, String>,
    pub client_params: BTreeMap<String, String>,
    /// Keep the engine's data directory after shutdown. Default: false.
    pub keep_data: Option<bool>,
    /// Launch attempts for transient start failures. Default: 3.
    pub launch_attempts: Option<u32>,
}

impl EngineSettings {
    pub fn effective_engine(&self) -> &str {
        self.engine.as_deref().unwrap_or("sqlite")
    }

    pub fn effective_max_connections(&self) -> usize {
        self.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS)
    }

    pub fn effective_keep_data(&self) -> bool {
        self.keep_data.unwrap_or(false)
    }

    pub fn effective_launch_attempts(&self) -> u32 {
        self.launch_attempts.unwrap_or(DEFAULT_LAUNCH_ATTEMPTS)
    }
}
