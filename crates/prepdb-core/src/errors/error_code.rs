//! ErrorCode trait for stable, machine-readable error identifiers.

/// Every error enum implements this to provide a structured code string
/// that test harnesses can match on without parsing messages.
pub trait ErrorCode {
    /// Returns the error code string (e.g., "PREPARATION_FAILED").
    fn error_code(&self) -> &'static str;

    /// Returns the formatted error string: `[ERROR_CODE] message`.
    fn coded_string(&self) -> String
    where
        Self: std::fmt::Display,
    {
        format!("[{}] {}", self.error_code(), self)
    }
}

pub const PREPARATION_FAILED: &str = "PREPARATION_FAILED";
pub const MIGRATION_FAILED: &str = "MIGRATION_FAILED";
pub const ENGINE_LAUNCH_FAILED: &str = "ENGINE_LAUNCH_FAILED";
pub const ENGINE_ERROR: &str = "ENGINE_ERROR";
pub const UNSUPPORTED_ENGINE: &str = "UNSUPPORTED_ENGINE";
pub const DATABASE_CREATION_FAILED: &str = "DATABASE_CREATION_FAILED";
pub const CANCELLED: &str = "CANCELLED";
pub const SHUTDOWN: &str = "SHUTDOWN";
pub const WORKER_FAILED: &str = "WORKER_FAILED";
pub const CONTEXT_CLOSED: &str = "CONTEXT_CLOSED";
pub const UNSUPPORTED_OPERATION: &str = "UNSUPPORTED_OPERATION";
pub const MISSING_PROVIDER: &str = "MISSING_PROVIDER";
pub const MISSING_DEPENDENCY: &str = "MISSING_DEPENDENCY";
pub const PROVIDER_BUILD_FAILED: &str = "PROVIDER_BUILD_FAILED";
pub const CONFIG_ERROR: &str = "CONFIG_ERROR";
