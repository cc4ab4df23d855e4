//! Template cache configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the template cache layer.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct TemplatingConfig {
    /// Whether databases are cloned from cached templates. Default: true.
    pub enabled: Option<bool>,
}

impl TemplatingConfig {
    pub fn effective_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}
