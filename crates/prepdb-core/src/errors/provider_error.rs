//! Provider errors: the single, causally-chained failure returned by
//! `create_database` at every layer of the provider stack.

use std::error::Error as StdError;
use std::sync::Arc;

use super::error_code::{self, ErrorCode};
use super::{EngineError, PreparationError};

/// Failure to provision a database.
///
/// Every variant that represents a real failure carries its cause, so the
/// deepest engine/SQL error is always reachable through `source()`.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Creation of database {database} failed: {source}")]
    Creation {
        database: String,
        #[source]
        source: EngineError,
    },

    #[error("Preparation of database {database} failed: {source}")]
    Preparation {
        database: String,
        #[source]
        source: PreparationError,
    },

    #[error("Engine unavailable: {0}")]
    Engine(#[source] Arc<EngineError>),

    /// A failure shared by every caller that waited on the same in-flight
    /// attempt.
    #[error(transparent)]
    Shared(Arc<ProviderError>),

    #[error("Provider {provider} does not support {operation}")]
    Unsupported { provider: String, operation: String },

    #[error("Prefetch task cancelled")]
    Cancelled,

    #[error("Provider is shut down")]
    Shutdown,

    #[error("Failed to spawn prefetch worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    #[error("Provisioning task panicked: {0}")]
    Panicked(String),

    #[error("Database context is closed")]
    ContextClosed,
}

impl ProviderError {
    /// The deepest error in the cause chain.
    pub fn root_cause(&self) -> &(dyn StdError + 'static) {
        let mut current: &(dyn StdError + 'static) = self;
        while let Some(next) = current.source() {
            current = next;
        }
        current
    }

    /// The preparation failure somewhere in the chain, if any.
    pub fn preparation_error(&self) -> Option<&PreparationError> {
        let mut current: Option<&(dyn StdError + 'static)> = Some(self);
        while let Some(err) = current {
            if let Some(prep) = err.downcast_ref::<PreparationError>() {
                return Some(prep);
            }
            current = err.source();
        }
        None
    }
}

impl From<EngineError> for ProviderError {
    fn from(error: EngineError) -> Self {
        Self::Engine(Arc::new(error))
    }
}

impl From<Arc<EngineError>> for ProviderError {
    fn from(error: Arc<EngineError>) -> Self {
        Self::Engine(error)
    }
}

impl From<Arc<ProviderError>> for ProviderError {
    fn from(error: Arc<ProviderError>) -> Self {
        match Arc::try_unwrap(error) {
            Ok(inner) => inner,
            Err(shared) => Self::Shared(shared),
        }
    }
}

impl ErrorCode for ProviderError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Creation { .. } => error_code::DATABASE_CREATION_FAILED,
            Self::Preparation { source, .. } => source.error_code(),
            Self::Engine(e) => e.error_code(),
            Self::Shared(e) => e.error_code(),
            Self::Unsupported { .. } => error_code::UNSUPPORTED_OPERATION,
            Self::Cancelled => error_code::CANCELLED,
            Self::Shutdown => error_code::SHUTDOWN,
            Self::WorkerSpawn(_) | Self::Panicked(_) => error_code::WORKER_FAILED,
            Self::ContextClosed => error_code::CONTEXT_CLOSED,
        }
    }
}
