//! Engine backends: the storage-level operations an engine instance needs.

pub mod clone_strategy;
pub mod sqlite;

pub use clone_strategy::{select_clone_strategy, BackupApi, CloneStrategy, VacuumInto};
pub use sqlite::SqliteBackend;

use prepdb_core::database::ConnectionSource;
use prepdb_core::errors::EngineError;

/// Storage operations of one running engine.
///
/// Implementations must be safe to call concurrently for distinct database
/// names. Cloning from a template that is concurrently being cloned by
/// other callers must also be safe.
pub trait EngineBackend: ConnectionSource {
    /// Engine version reported at launch.
    fn version(&self) -> &str;

    /// Create an empty database named `database` with the engine's init
    /// parameters applied.
    fn create_blank(&self, database: &str) -> Result<(), EngineError>;

    /// Engine-native copy of `template` into a new database `database`.
    fn clone_database(&self, template: &str, database: &str) -> Result<(), EngineError>;

    /// Remove `database`. Dropping a database that does not exist is not an
    /// error.
    fn drop_database(&self, database: &str) -> Result<(), EngineError>;
}
