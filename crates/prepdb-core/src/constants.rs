/// prepdb version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default maximum number of concurrently open connections per engine instance.
pub const DEFAULT_MAX_CONNECTIONS: usize = 300;

/// Default number of worker threads servicing prefetch pipelines.
pub const DEFAULT_PREFETCH_THREADS: usize = 3;

/// Default number of databases a fresh pipeline prepares ahead of demand.
pub const DEFAULT_PIPELINE_CACHE_SIZE: usize = 3;

/// Default number of launch attempts for transient engine start failures.
pub const DEFAULT_LAUNCH_ATTEMPTS: u32 = 3;

/// Table used by migration steps to record applied versions.
pub const DEFAULT_HISTORY_TABLE: &str = "_prepdb_schema_history";

/// Prefix for generated database names.
pub const DATABASE_NAME_PREFIX: &str = "prepdb";
