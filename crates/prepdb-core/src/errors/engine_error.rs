//! Engine-level errors: launching, cloning, dropping, opening connections.

use super::error_code::{self, ErrorCode};
use super::PreparationError;

/// Errors raised by an engine instance or its launcher.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Engine '{engine}' failed to launch: {message}")]
    LaunchFailed {
        engine: String,
        message: String,
        transient: bool,
    },

    #[error("Unsupported engine: {0}")]
    UnsupportedEngine(String),

    #[error("Engine version {actual} is older than required {required}")]
    VersionMismatch { required: String, actual: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Database not found: {0}")]
    UnknownDatabase(String),

    #[error("Customizer '{customizer}' failed: {source}")]
    Customizer {
        customizer: String,
        #[source]
        source: PreparationError,
    },

    #[error("Admission semaphore closed")]
    AdmissionClosed,
}

impl EngineError {
    /// Whether retrying the failed operation may succeed (e.g. a port or
    /// directory-name collision while launching).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::LaunchFailed {
                transient: true,
                ..
            }
        )
    }

    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

impl ErrorCode for EngineError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::LaunchFailed { .. } | Self::VersionMismatch { .. } => {
                error_code::ENGINE_LAUNCH_FAILED
            }
            Self::UnsupportedEngine(_) => error_code::UNSUPPORTED_ENGINE,
            _ => error_code::ENGINE_ERROR,
        }
    }
}
