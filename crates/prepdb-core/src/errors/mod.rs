//! Error handling for prepdb.
//! One error enum per subsystem, `thiserror` only, zero `anyhow`.

pub mod config_error;
pub mod engine_error;
pub mod error_code;
pub mod preparation_error;
pub mod provider_error;
pub mod registry_error;

pub use config_error::ConfigError;
pub use engine_error::EngineError;
pub use error_code::ErrorCode;
pub use preparation_error::PreparationError;
pub use provider_error::ProviderError;
pub use registry_error::RegistryError;
