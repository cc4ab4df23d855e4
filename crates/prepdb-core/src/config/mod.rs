//! Configuration system for prepdb.
//! TOML-based, 3-layer resolution: env > file > defaults.

pub mod engine_settings;
pub mod prefetch_config;
pub mod prepdb_config;
pub mod templating_config;

pub use engine_settings::EngineSettings;
pub use prefetch_config::PrefetchConfig;
pub use prepdb_config::PrepdbConfig;
pub use templating_config::TemplatingConfig;
