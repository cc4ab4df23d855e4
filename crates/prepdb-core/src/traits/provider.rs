use std::fmt;

use crate::database::Database;
use crate::errors::ProviderError;
use crate::preparer::CompositePreparer;
use crate::request::{DatabaseRequest, DatabaseTemplate};

/// Stable identity of a provider, used as part of every cache key.
/// Two providers with equal identities must produce equivalent databases
/// for equal preparers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProviderIdentity(String);

impl ProviderIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Consumer-facing provider: produce a fresh database with `preparer` applied.
pub trait DatabaseProvider: Send + Sync {
    fn identity(&self) -> ProviderIdentity;

    fn create_database(&self, preparer: &CompositePreparer) -> Result<Database, ProviderError>;
}

/// A provider that can also materialize and clone templates.
pub trait TemplatableProvider: DatabaseProvider {
    /// Create a database for `request` (from scratch or cloned from its template).
    fn create_database_from(&self, request: DatabaseRequest) -> Result<Database, ProviderError>;

    /// Create a database for `request` and expose it as a reusable template.
    fn create_template(&self, request: DatabaseRequest) -> Result<DatabaseTemplate, ProviderError>;
}
