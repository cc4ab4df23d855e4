//! Prefetch pipeline configuration.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_PIPELINE_CACHE_SIZE, DEFAULT_PREFETCH_THREADS};

/// Configuration for the speculative prefetching layer.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct PrefetchConfig {
    /// Worker threads shared by all pipelines. Default: 3.
    pub thread_pool_size: Option<usize>,
    /// Databases prepared ahead of demand when a pipeline is first used. Default: 3.
    pub pipeline_cache_size: Option<usize>,
}

impl PrefetchConfig {
    pub fn effective_thread_pool_size(&self) -> usize {
        self.thread_pool_size.unwrap_or(DEFAULT_PREFETCH_THREADS)
    }

    pub fn effective_pipeline_cache_size(&self) -> usize {
        self.pipeline_cache_size.unwrap_or(DEFAULT_PIPELINE_CACHE_SIZE)
    }
}
