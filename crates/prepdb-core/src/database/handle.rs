//! Database handles and admission-guarded connections.

use std::fmt;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use rusqlite::Connection;
use tracing::{debug, warn};

use super::admission::{AdmissionPermit, AdmissionSemaphore};
use crate::errors::EngineError;

/// Opens raw connections to named databases inside one engine instance.
pub trait ConnectionSource: Send + Sync {
    /// Open a new raw connection to `database`.
    fn open(&self, database: &str) -> Result<Connection, EngineError>;

    /// Physical location of `database`, if the engine stores it in a file.
    fn location(&self, database: &str) -> Option<PathBuf> {
        let _ = database;
        None
    }
}

type ReleaseFn = Box<dyn FnOnce(&str) + Send>;

/// A live, connectable database owned by the caller.
///
/// Every connection obtained through [`Database::connection`] holds an
/// admission permit until that connection is closed. Closing (or dropping)
/// the handle runs its release callback, which returns the database to the
/// engine.
pub struct Database {
    name: String,
    source: Arc<dyn ConnectionSource>,
    admission: Arc<AdmissionSemaphore>,
    client_params: Vec<(String, String)>,
    release: Mutex<Option<ReleaseFn>>,
}

impl Database {
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn ConnectionSource>,
        admission: Arc<AdmissionSemaphore>,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            admission,
            client_params: Vec::new(),
            release: Mutex::new(None),
        }
    }

    /// Parameters appended to the connection URI handed to consumers.
    pub fn with_client_params(
        mut self,
        params: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        self.client_params = params.into_iter().collect();
        self
    }

    /// Callback run once when the handle is closed or dropped.
    pub fn with_release<F>(mut self, release: F) -> Self
    where
        F: FnOnce(&str) + Send + 'static,
    {
        self.release = Mutex::new(Some(Box::new(release)));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Open an admission-guarded connection. Blocks while the engine's
    /// connection limit is reached.
    pub fn connection(&self) -> Result<GuardedConnection, EngineError> {
        let permit = self.admission.acquire()?;
        let conn = self.source.open(&self.name)?;
        Ok(GuardedConnection { conn, permit })
    }

    /// Physical file backing this database, if any.
    pub fn path(&self) -> Option<PathBuf> {
        self.source.location(&self.name)
    }

    /// SQLite URI (`file:<path>?k=v`) for consumers that open their own
    /// connections. Such connections bypass admission control.
    pub fn uri(&self) -> Option<String> {
        let path = self.path()?;
        let mut uri = format!("file:{}", path.display());
        for (i, (key, value)) in self.client_params.iter().enumerate() {
            uri.push(if i == 0 { '?' } else { '&' });
            uri.push_str(key);
            uri.push('=');
            uri.push_str(value);
        }
        Some(uri)
    }

    pub fn admission(&self) -> &Arc<AdmissionSemaphore> {
        &self.admission
    }

    /// Release the database back to the engine.
    pub fn close(self) {
        self.run_release();
    }

    fn run_release(&self) {
        let release = self
            .release
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(release) = release {
            debug!(database = %self.name, "releasing database");
            release(&self.name);
        }
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.run_release();
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("available_permits", &self.admission.available())
            .finish()
    }
}

/// A raw connection plus the admission permit it occupies.
///
/// Field order matters: the connection is closed before the permit is
/// released.
pub struct GuardedConnection {
    conn: Connection,
    permit: AdmissionPermit,
}

impl GuardedConnection {
    /// Close the connection, then release the permit. The permit is released
    /// even when closing reports an error.
    pub fn close(self) -> Result<(), EngineError> {
        let GuardedConnection { conn, permit } = self;
        let result = conn.close().map_err(|(_, e)| EngineError::Sqlite(e));
        if let Err(e) = &result {
            warn!(error = %e, "connection close failed");
        }
        drop(permit);
        result
    }
}

impl Deref for GuardedConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl fmt::Debug for GuardedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedConnection").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SharedFile(tempfile::TempDir);

    impl ConnectionSource for SharedFile {
        fn open(&self, database: &str) -> Result<Connection, EngineError> {
            Ok(Connection::open(self.0.path().join(format!("{database}.db")))?)
        }

        fn location(&self, database: &str) -> Option<PathBuf> {
            Some(self.0.path().join(format!("{database}.db")))
        }
    }

    fn database(capacity: usize) -> Database {
        let source = Arc::new(SharedFile(tempfile::tempdir().unwrap()));
        Database::new("db", source, AdmissionSemaphore::new(capacity))
    }

    #[test]
    fn connections_hold_permits_until_closed() {
        let db = database(2);
        let a = db.connection().unwrap();
        let b = db.connection().unwrap();
        assert_eq!(db.admission().available(), 0);
        a.close().unwrap();
        assert_eq!(db.admission().available(), 1);
        drop(b);
        assert_eq!(db.admission().available(), 2);
    }

    #[test]
    fn permit_released_after_failed_statement() {
        let db = database(1);
        {
            let conn = db.connection().unwrap();
            assert!(conn.execute_batch("NOT VALID SQL").is_err());
        }
        assert_eq!(db.admission().available(), 1);
    }

    #[test]
    fn release_runs_once_on_close() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let db = database(1).with_release(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        db.close();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handles_are_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Database>();

        let db = Arc::new(database(1));
        let worker = Arc::clone(&db);
        let rows: i64 = std::thread::spawn(move || {
            let conn = worker.connection().unwrap();
            conn.query_row("SELECT 1", [], |row| row.get(0)).unwrap()
        })
        .join()
        .unwrap();
        assert_eq!(rows, 1);
        assert_eq!(db.admission().available(), 1);
    }

    #[test]
    fn uri_carries_client_params() {
        let db = database(1).with_client_params([
            ("mode".to_string(), "rw".to_string()),
            ("cache".to_string(), "private".to_string()),
        ]);
        let uri = db.uri().unwrap();
        assert!(uri.starts_with("file:"));
        assert!(uri.ends_with("db.db?mode=rw&cache=private"));
    }
}
