//! EngineProvider and EngineInstanceCache: memoized launches and retry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use prepdb_core::errors::{EngineError, ProviderError};
use prepdb_core::preparer::SqlScript;
use prepdb_core::{CompositePreparer, DatabaseProvider, Step};
use prepdb_engine::{
    EngineBackend, EngineConfig, EngineInstanceCache, EngineLauncher, EngineProvider,
    SqliteLauncher,
};

/// Counts launches and fails the first `failures` of them.
struct FlakyLauncher {
    launches: AtomicUsize,
    failures: usize,
    transient: bool,
}

impl FlakyLauncher {
    fn new(failures: usize, transient: bool) -> Arc<Self> {
        Arc::new(Self {
            launches: AtomicUsize::new(0),
            failures,
            transient,
        })
    }

    fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

impl EngineLauncher for FlakyLauncher {
    fn launch(&self, config: &EngineConfig) -> Result<Arc<dyn EngineBackend>, EngineError> {
        let attempt = self.launches.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(EngineError::LaunchFailed {
                engine: config.engine().to_string(),
                message: format!("simulated failure {attempt}"),
                transient: self.transient,
            });
        }
        SqliteLauncher.launch(config)
    }
}

fn create_table() -> CompositePreparer {
    CompositePreparer::from(Step::new(SqlScript::new("CREATE TABLE t (id INTEGER)")))
}

#[test]
fn concurrent_first_access_launches_once() {
    let launcher = FlakyLauncher::new(0, false);
    let cache = Arc::new(EngineInstanceCache::new(launcher.clone()));
    let config = EngineConfig::sqlite();
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let config = config.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache.get_or_launch(&config).unwrap()
            })
        })
        .collect();
    let instances: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(launcher.launches(), 1);
    assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert_eq!(cache.len(), 1);
}

#[test]
fn distinct_configs_get_distinct_instances() {
    let cache = EngineInstanceCache::sqlite();
    let a = cache.get_or_launch(&EngineConfig::sqlite()).unwrap();
    let b = cache
        .get_or_launch(
            &EngineConfig::builder("sqlite")
                .server_param("foreign_keys", "ON")
                .build(),
        )
        .unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(cache.len(), 2);
}

#[test]
fn transient_launch_failures_are_retried() {
    let launcher = FlakyLauncher::new(2, true);
    let cache = Arc::new(EngineInstanceCache::new(launcher.clone()));
    let provider = EngineProvider::new(EngineConfig::sqlite(), cache).with_launch_attempts(3);

    let db = provider.create_database(&create_table()).unwrap();
    assert_eq!(launcher.launches(), 3);
    let count: i64 = db
        .connection()
        .unwrap()
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE name = 't'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn retries_are_bounded() {
    let launcher = FlakyLauncher::new(10, true);
    let cache = Arc::new(EngineInstanceCache::new(launcher.clone()));
    let provider = EngineProvider::new(EngineConfig::sqlite(), cache).with_launch_attempts(2);

    let err = provider.create_database(&create_table()).unwrap_err();
    assert!(matches!(err, ProviderError::Engine(ref e) if e.is_transient()));
    assert_eq!(launcher.launches(), 2);
}

#[test]
fn permanent_launch_failures_are_not_retried_or_cached() {
    let launcher = FlakyLauncher::new(1, false);
    let cache = Arc::new(EngineInstanceCache::new(launcher.clone()));
    let provider = EngineProvider::new(EngineConfig::sqlite(), Arc::clone(&cache));

    assert!(provider.create_database(&create_table()).is_err());
    assert_eq!(launcher.launches(), 1);
    assert!(cache.is_empty());

    // The failure was not cached: the next caller launches again.
    assert!(provider.create_database(&create_table()).is_ok());
    assert_eq!(launcher.launches(), 2);
}

#[test]
fn identity_follows_config() {
    let cache = Arc::new(EngineInstanceCache::sqlite());
    let a = EngineProvider::new(EngineConfig::sqlite(), Arc::clone(&cache));
    let b = EngineProvider::new(EngineConfig::sqlite(), Arc::clone(&cache));
    let c = EngineProvider::new(
        EngineConfig::builder("sqlite").max_connections(5).build(),
        cache,
    );
    assert_eq!(a.identity(), b.identity());
    assert_ne!(a.identity(), c.identity());
}
