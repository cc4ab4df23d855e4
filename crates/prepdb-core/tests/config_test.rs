//! Tests for the prepdb configuration system.

use std::sync::Mutex;

use prepdb_core::config::PrepdbConfig;
use prepdb_core::errors::ConfigError;

/// Global mutex to serialize tests that modify environment variables.
static ENV_MUTEX: Mutex<()> = Mutex::new(());

fn clear_prepdb_env_vars() {
    for key in [
        "PREPDB_MAX_CONNECTIONS",
        "PREPDB_PREFETCH_THREADS",
        "PREPDB_PIPELINE_CACHE_SIZE",
        "PREPDB_KEEP_DATA",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn test_defaults() {
    let config = PrepdbConfig::default();
    assert_eq!(config.engine.effective_engine(), "sqlite");
    assert_eq!(config.engine.effective_max_connections(), 300);
    assert_eq!(config.engine.effective_launch_attempts(), 3);
    assert!(!config.engine.effective_keep_data());
    assert_eq!(config.prefetch.effective_thread_pool_size(), 3);
    assert_eq!(config.prefetch.effective_pipeline_cache_size(), 3);
    assert!(config.templating.effective_enabled());
}

#[test]
fn test_from_toml_with_parameter_maps() {
    let config = PrepdbConfig::from_toml(
        r#"
[engine]
max_connections = 20

[engine.init_params]
page_size = "4096"

[engine.server_params]
foreign_keys = "ON"

[prefetch]
pipeline_cache_size = 5
"#,
    )
    .unwrap();

    assert_eq!(config.engine.effective_max_connections(), 20);
    assert_eq!(config.engine.init_params.get("page_size").map(String::as_str), Some("4096"));
    assert_eq!(config.engine.server_params.get("foreign_keys").map(String::as_str), Some("ON"));
    assert_eq!(config.prefetch.effective_pipeline_cache_size(), 5);
    assert_eq!(config.prefetch.effective_thread_pool_size(), 3);
}

#[test]
fn test_validation_rejects_zero_counts() {
    let err = PrepdbConfig::from_toml("[prefetch]\nthread_pool_size = 0\n").unwrap_err();
    assert!(matches!(err, ConfigError::ValidationFailed { ref field, .. } if field == "prefetch.thread_pool_size"));

    let err = PrepdbConfig::from_toml("[engine]\nmax_connections = 0\n").unwrap_err();
    assert!(matches!(err, ConfigError::ValidationFailed { .. }));
}

#[test]
fn test_invalid_toml_is_parse_error() {
    let err = PrepdbConfig::from_toml("[engine\nmax_connections = ").unwrap_err();
    assert!(matches!(err, ConfigError::ParseError { .. }));
}

#[test]
fn test_load_missing_file_falls_back_to_defaults() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_prepdb_env_vars();

    let dir = tempfile::tempdir().unwrap();
    let config = PrepdbConfig::load(&dir.path().join("prepdb.toml")).unwrap();
    assert_eq!(config, PrepdbConfig::default());
}

#[test]
fn test_env_overrides_file() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_prepdb_env_vars();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prepdb.toml");
    std::fs::write(&path, "[engine]\nmax_connections = 10\n\n[prefetch]\nthread_pool_size = 2\n").unwrap();

    std::env::set_var("PREPDB_MAX_CONNECTIONS", "42");
    let config = PrepdbConfig::load(&path).unwrap();
    assert_eq!(config.engine.max_connections, Some(42));
    assert_eq!(config.prefetch.thread_pool_size, Some(2));

    clear_prepdb_env_vars();
}

#[test]
fn test_toml_roundtrip_preserves_settings() {
    let config = PrepdbConfig::from_toml("[engine]\nkeep_data = true\n").unwrap();
    let reparsed = PrepdbConfig::from_toml(&config.to_toml().unwrap()).unwrap();
    assert_eq!(reparsed, config);
}
