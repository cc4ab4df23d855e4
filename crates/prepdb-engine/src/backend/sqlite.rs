//! SqliteBackend: One cluster directory holding one file per database.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};
use tempfile::TempDir;
use tracing::{debug, info};

use prepdb_core::database::ConnectionSource;
use prepdb_core::errors::EngineError;

use super::clone_strategy::{self, CloneStrategy};
use super::EngineBackend;
use crate::config::EngineConfig;

const SIDECAR_SUFFIXES: [&str; 3] = ["-wal", "-shm", "-journal"];

pub struct SqliteBackend {
    root: PathBuf,
    /// Deletes the cluster directory on drop. `None` when data is kept.
    _cluster: Option<TempDir>,
    version: String,
    init_params: BTreeMap<String, String>,
    server_params: BTreeMap<String, String>,
    clone_strategy: Box<dyn CloneStrategy>,
}

impl SqliteBackend {
    /// Start a backend for `config`: probe the library version, check the
    /// minimum version, pick the clone strategy and create the cluster
    /// directory.
    pub fn start(config: &EngineConfig) -> Result<Self, EngineError> {
        let version = clone_strategy::probe_version().map_err(|e| EngineError::LaunchFailed {
            engine: config.engine().to_string(),
            message: format!("version probe failed: {e}"),
            transient: false,
        })?;
        if let Some(required) = config.min_version() {
            if !clone_strategy::version_at_least(&version, required) {
                return Err(EngineError::VersionMismatch {
                    required: required.to_string(),
                    actual: version,
                });
            }
        }

        let (root, cluster) = create_cluster(config)?;
        let clone_strategy = clone_strategy::select_clone_strategy(&version);
        info!(
            root = %root.display(),
            version = %version,
            clone_strategy = clone_strategy.name(),
            keep_data = config.keep_data(),
            "sqlite engine started"
        );

        Ok(Self {
            root,
            _cluster: cluster,
            version,
            init_params: config.init_params().clone(),
            server_params: config.server_params().clone(),
            clone_strategy,
        })
    }

    /// Cluster directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn clone_strategy(&self) -> &dyn CloneStrategy {
        self.clone_strategy.as_ref()
    }

    fn file(&self, database: &str) -> PathBuf {
        self.root.join(format!("{database}.db"))
    }
}

fn create_cluster(config: &EngineConfig) -> Result<(PathBuf, Option<TempDir>), EngineError> {
    let launch_error = |e: io::Error| EngineError::LaunchFailed {
        engine: config.engine().to_string(),
        message: e.to_string(),
        transient: matches!(
            e.kind(),
            io::ErrorKind::AlreadyExists | io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
        ),
    };
    let base = config
        .base_dir()
        .map(Path::to_path_buf)
        .unwrap_or_else(std::env::temp_dir);

    if config.keep_data() {
        let root = base.join(format!("prepdb-{}", uuid::Uuid::new_v4().simple()));
        fs::create_dir_all(&root).map_err(launch_error)?;
        return Ok((root, None));
    }

    let dir = tempfile::Builder::new()
        .prefix("prepdb-")
        .tempdir_in(&base)
        .map_err(launch_error)?;
    Ok((dir.path().to_path_buf(), Some(dir)))
}

fn apply_pragmas(conn: &Connection, params: &BTreeMap<String, String>) -> Result<(), EngineError> {
    for (key, value) in params {
        conn.pragma_update(None, key, value)?;
    }
    Ok(())
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn remove_if_exists(path: &Path) -> Result<bool, EngineError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(EngineError::io(path, e)),
    }
}

impl ConnectionSource for SqliteBackend {
    fn open(&self, database: &str) -> Result<Connection, EngineError> {
        let path = self.file(database);
        if !path.exists() {
            return Err(EngineError::UnknownDatabase(database.to_string()));
        }
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        apply_pragmas(&conn, &self.server_params)?;
        Ok(conn)
    }

    fn location(&self, database: &str) -> Option<PathBuf> {
        Some(self.file(database))
    }
}

impl EngineBackend for SqliteBackend {
    fn version(&self) -> &str {
        &self.version
    }

    fn create_blank(&self, database: &str) -> Result<(), EngineError> {
        let path = self.file(database);
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        apply_pragmas(&conn, &self.init_params)?;
        // Materialize the header so the file is a valid clone source.
        conn.execute_batch("PRAGMA user_version = 0;")?;
        conn.close().map_err(|(_, e)| EngineError::Sqlite(e))?;
        debug!(database, "blank database created");
        Ok(())
    }

    fn clone_database(&self, template: &str, database: &str) -> Result<(), EngineError> {
        let source = self.file(template);
        if !source.exists() {
            return Err(EngineError::UnknownDatabase(template.to_string()));
        }
        self.clone_strategy.clone_file(&source, &self.file(database))?;
        debug!(template, database, strategy = self.clone_strategy.name(), "database cloned");
        Ok(())
    }

    fn drop_database(&self, database: &str) -> Result<(), EngineError> {
        let path = self.file(database);
        let mut removed = remove_if_exists(&path)?;
        for suffix in SIDECAR_SUFFIXES {
            removed |= remove_if_exists(&sidecar(&path, suffix))?;
        }
        debug!(database, removed, "database dropped");
        Ok(())
    }
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("root", &self.root)
            .field("version", &self.version)
            .field("clone_strategy", &self.clone_strategy.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> SqliteBackend {
        SqliteBackend::start(&EngineConfig::sqlite()).unwrap()
    }

    #[test]
    fn blank_clone_and_drop() {
        let backend = backend();
        backend.create_blank("tpl").unwrap();
        backend
            .open("tpl")
            .unwrap()
            .execute_batch("CREATE TABLE t (id INTEGER);")
            .unwrap();

        backend.clone_database("tpl", "copy").unwrap();
        let copy = backend.open("copy").unwrap();
        copy.execute("INSERT INTO t VALUES (1)", []).unwrap();
        drop(copy);

        let count: i64 = backend
            .open("tpl")
            .unwrap()
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);

        backend.drop_database("copy").unwrap();
        assert!(!backend.file("copy").exists());
        assert!(matches!(
            backend.open("copy"),
            Err(EngineError::UnknownDatabase(_))
        ));
        backend.drop_database("copy").unwrap();
    }

    #[test]
    fn init_and_server_params_are_applied() {
        let config = EngineConfig::builder("sqlite")
            .init_param("page_size", "8192")
            .server_param("foreign_keys", "ON")
            .build();
        let backend = SqliteBackend::start(&config).unwrap();
        backend.create_blank("db").unwrap();
        let conn = backend.open("db").unwrap();
        let page_size: i64 = conn.pragma_query_value(None, "page_size", |r| r.get(0)).unwrap();
        let foreign_keys: i64 = conn
            .pragma_query_value(None, "foreign_keys", |r| r.get(0))
            .unwrap();
        assert_eq!(page_size, 8192);
        assert_eq!(foreign_keys, 1);
    }

    #[test]
    fn cluster_removed_on_drop_unless_kept() {
        let backend = backend();
        let root = backend.root().to_path_buf();
        assert!(root.exists());
        drop(backend);
        assert!(!root.exists());

        let base = tempfile::tempdir().unwrap();
        let kept = SqliteBackend::start(
            &EngineConfig::builder("sqlite")
                .keep_data(true)
                .base_dir(base.path())
                .build(),
        )
        .unwrap();
        let root = kept.root().to_path_buf();
        drop(kept);
        assert!(root.exists());
    }

    #[test]
    fn min_version_is_enforced() {
        let config = EngineConfig::builder("sqlite").min_version("999.0.0").build();
        assert!(matches!(
            SqliteBackend::start(&config),
            Err(EngineError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn cloning_unknown_template_fails() {
        let backend = backend();
        assert!(matches!(
            backend.clone_database("missing", "db"),
            Err(EngineError::UnknownDatabase(_))
        ));
    }
}
