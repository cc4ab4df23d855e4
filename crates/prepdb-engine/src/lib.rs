//! # prepdb-engine
//!
//! Engine layer for prepdb. One [`EngineInstance`] owns a running SQLite
//! "cluster" (a directory of database files), creates blank databases,
//! clones databases from templates, and drops them again. Instances are
//! memoized per [`EngineConfig`] by the [`EngineInstanceCache`], and the
//! [`EngineProvider`] exposes them through the provider traits.

pub mod backend;
pub mod cache;
pub mod config;
pub mod instance;
pub mod launcher;
pub mod names;
pub mod provider;

pub use backend::{EngineBackend, SqliteBackend};
pub use cache::EngineInstanceCache;
pub use config::{Customizer, EngineConfig, EngineConfigBuilder};
pub use instance::EngineInstance;
pub use launcher::{EngineLauncher, SqliteLauncher};
pub use provider::EngineProvider;
