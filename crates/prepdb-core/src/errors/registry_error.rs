//! Provider registry errors.

use super::error_code::{self, ErrorCode};
use super::ProviderError;

/// Errors resolving or building a provider by type name.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("No database provider registered for type '{provider}' (known providers: {known})")]
    MissingProvider { provider: String, known: String },

    #[error("Database provider '{provider}' requires {dependency}, which is not available. {hint}")]
    MissingDependency {
        provider: String,
        dependency: String,
        hint: String,
    },

    #[error("Failed to build provider '{provider}': {source}")]
    Build {
        provider: String,
        #[source]
        source: ProviderError,
    },
}

impl ErrorCode for RegistryError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::MissingProvider { .. } => error_code::MISSING_PROVIDER,
            Self::MissingDependency { .. } => error_code::MISSING_DEPENDENCY,
            Self::Build { .. } => error_code::PROVIDER_BUILD_FAILED,
        }
    }
}
