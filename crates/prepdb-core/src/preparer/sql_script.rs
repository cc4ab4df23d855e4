//! SqlScript: Executes a batch of SQL statements.

use rusqlite::Connection;

use super::{PreparationStep, StepDescriptor};
use crate::errors::PreparationError;

/// A value-comparable step that runs a SQL batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlScript {
    name: Option<String>,
    sql: String,
}

impl SqlScript {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            name: None,
            sql: sql.into(),
        }
    }

    /// A named script; the name shows up in error messages and logs only.
    pub fn named(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            sql: sql.into(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

impl PreparationStep for SqlScript {
    fn apply(&self, conn: &Connection) -> Result<(), PreparationError> {
        conn.execute_batch(&self.sql).map_err(|e| {
            PreparationError::sql(self.name.as_deref().unwrap_or("sql"), e)
        })
    }

    fn descriptor(&self) -> Option<StepDescriptor> {
        Some(
            StepDescriptor::builder("sql")
                .param("sql", &self.sql)
                .build(),
        )
    }
}
