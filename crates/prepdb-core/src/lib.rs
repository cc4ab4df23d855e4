//! # prepdb-core
//!
//! Foundation crate for prepdb.
//! Defines preparers, request/template values, guarded database handles,
//! provider traits, errors, config, and constants.
//! The engine and provider crates depend on this.

pub mod config;
pub mod constants;
pub mod database;
pub mod errors;
pub mod preparer;
pub mod request;
pub mod tracing;
pub mod traits;

// Re-export the most commonly used types at the crate root.
pub use config::PrepdbConfig;
pub use database::{AdmissionSemaphore, ConnectionSource, Database, GuardedConnection};
pub use errors::{EngineError, PreparationError, ProviderError, RegistryError};
pub use preparer::{CompositePreparer, PreparationStep, Step, StepDescriptor};
pub use request::{DatabaseRequest, DatabaseTemplate};
pub use traits::{DatabaseProvider, ProviderIdentity, TemplatableProvider};
