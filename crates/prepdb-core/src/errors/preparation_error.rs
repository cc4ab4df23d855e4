//! Errors raised by preparation steps.

use super::error_code::{self, ErrorCode};

/// Failure inside a single preparation step.
#[derive(Debug, thiserror::Error)]
pub enum PreparationError {
    #[error("SQL error in step '{step}': {source}")]
    Sql {
        step: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Migration V{version} ({description}) failed: {source}")]
    Migration {
        version: u32,
        description: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Migration history in '{table}' is not empty, cannot baseline at V{version}")]
    BaselineRejected { table: String, version: u32 },

    #[error("Step '{step}' failed: {source}")]
    Custom {
        step: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl PreparationError {
    /// Wrap a SQLite error raised while running `step`.
    pub fn sql(step: impl Into<String>, source: rusqlite::Error) -> Self {
        Self::Sql {
            step: step.into(),
            source,
        }
    }
}

impl ErrorCode for PreparationError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Migration { .. } | Self::BaselineRejected { .. } => error_code::MIGRATION_FAILED,
            Self::Sql { .. } | Self::Custom { .. } => error_code::PREPARATION_FAILED,
        }
    }
}
