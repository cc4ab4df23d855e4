//! Clone strategies, selected once per engine by a version probe.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use rusqlite::backup::Backup;
use rusqlite::{Connection, OpenFlags};
use tracing::debug;

use prepdb_core::errors::EngineError;

/// First SQLite release supporting `VACUUM INTO`.
const VACUUM_INTO_SINCE: (u32, u32, u32) = (3, 27, 0);
/// Pages copied per backup step. Must be positive.
const BACKUP_PAGES_PER_STEP: i32 = 100;
const BACKUP_STEP_PAUSE: Duration = Duration::from_millis(10);

/// Copies a database file into a new database file.
pub trait CloneStrategy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Copy `source` into `target`. `target` must not exist yet.
    fn clone_file(&self, source: &Path, target: &Path) -> Result<(), EngineError>;
}

/// `VACUUM INTO` from a read-only connection on the template.
#[derive(Debug, Clone, Copy, Default)]
pub struct VacuumInto;

impl CloneStrategy for VacuumInto {
    fn name(&self) -> &'static str {
        "vacuum_into"
    }

    fn clone_file(&self, source: &Path, target: &Path) -> Result<(), EngineError> {
        let src = open_read_only(source)?;
        src.execute("VACUUM INTO ?1", [target.to_string_lossy().into_owned()])?;
        src.close().map_err(|(_, e)| EngineError::Sqlite(e))
    }
}

/// Page-by-page copy through the online backup API.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackupApi;

impl CloneStrategy for BackupApi {
    fn name(&self) -> &'static str {
        "backup_api"
    }

    fn clone_file(&self, source: &Path, target: &Path) -> Result<(), EngineError> {
        let src = open_read_only(source)?;
        let mut dst = Connection::open(target)?;
        {
            let backup = Backup::new(&src, &mut dst)?;
            backup.run_to_completion(BACKUP_PAGES_PER_STEP, BACKUP_STEP_PAUSE, None)?;
        }
        dst.close().map_err(|(_, e)| EngineError::Sqlite(e))?;
        src.close().map_err(|(_, e)| EngineError::Sqlite(e))
    }
}

fn open_read_only(path: &Path) -> Result<Connection, EngineError> {
    Ok(Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?)
}

/// Pick the clone strategy for an engine reporting `version`.
pub fn select_clone_strategy(version: &str) -> Box<dyn CloneStrategy> {
    let strategy: Box<dyn CloneStrategy> = match parse_version(version) {
        Some(v) if v >= VACUUM_INTO_SINCE => Box::new(VacuumInto),
        _ => Box::new(BackupApi),
    };
    debug!(version, strategy = strategy.name(), "clone strategy selected");
    strategy
}

/// Parse `major.minor.patch`. Missing components count as zero.
pub fn parse_version(version: &str) -> Option<(u32, u32, u32)> {
    let mut parts = version.trim().split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = match parts.next() {
        Some(p) => p.parse().ok()?,
        None => 0,
    };
    let patch = match parts.next() {
        Some(p) => p.parse().ok()?,
        None => 0,
    };
    Some((major, minor, patch))
}

/// Whether `actual` is at least `required`. Unparseable versions never
/// satisfy a requirement.
pub fn version_at_least(actual: &str, required: &str) -> bool {
    match (parse_version(actual), parse_version(required)) {
        (Some(a), Some(r)) => a >= r,
        _ => false,
    }
}

/// Version of the linked SQLite library.
pub fn probe_version() -> Result<String, EngineError> {
    let conn = Connection::open_in_memory()?;
    Ok(conn.query_row("SELECT sqlite_version()", [], |row| row.get(0))?)
}
