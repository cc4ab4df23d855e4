//! Value-based step identity.
//!
//! A descriptor is an immutable snapshot of the settings a step was defined
//! with. Two steps whose descriptors are equal are interchangeable as far as
//! the template cache is concerned.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Structurally comparable, hashable snapshot of a step's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepDescriptor {
    kind: String,
    params: BTreeMap<String, String>,
}

impl StepDescriptor {
    pub fn builder(kind: impl Into<String>) -> StepDescriptorBuilder {
        StepDescriptorBuilder {
            kind: kind.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }
}

impl fmt::Display for StepDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if !self.params.is_empty() {
            let parts: Vec<String> = self.params.keys().cloned().collect();
            write!(f, "({})", parts.join(","))?;
        }
        Ok(())
    }
}

/// Field-copying builder for [`StepDescriptor`].
#[derive(Debug, Clone)]
pub struct StepDescriptorBuilder {
    kind: String,
    params: BTreeMap<String, String>,
}

impl StepDescriptorBuilder {
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    /// Record an optional setting; `None` is stored as an absent key.
    pub fn opt_param(self, key: impl Into<String>, value: Option<impl ToString>) -> Self {
        match value {
            Some(v) => self.param(key, v),
            None => self,
        }
    }

    pub fn build(self) -> StepDescriptor {
        StepDescriptor {
            kind: self.kind,
            params: self.params,
        }
    }
}
