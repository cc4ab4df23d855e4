//! FnStep: Wraps an arbitrary closure as an identity-compared step.

use std::fmt;

use rusqlite::Connection;

use super::PreparationStep;
use crate::errors::PreparationError;

type StepFn =
    dyn Fn(&Connection) -> Result<(), Box<dyn std::error::Error + Send + Sync>> + Send + Sync;

/// Closure-backed step. Two `FnStep`s are never equal unless they are the
/// same `Step` (clones share the allocation).
pub struct FnStep {
    label: String,
    f: Box<StepFn>,
}

impl FnStep {
    pub fn new<F>(label: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Connection) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            label: label.into(),
            f: Box::new(f),
        }
    }
}

impl fmt::Debug for FnStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStep").field("label", &self.label).finish()
    }
}

impl PreparationStep for FnStep {
    fn apply(&self, conn: &Connection) -> Result<(), PreparationError> {
        (self.f)(conn).map_err(|source| PreparationError::Custom {
            step: self.label.clone(),
            source,
        })
    }
}
