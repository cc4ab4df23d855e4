//! TemplateCache: Templates keyed by (provider identity, preparer).

use std::sync::Arc;

use moka::sync::Cache;
use tracing::{debug, trace};

use prepdb_core::errors::ProviderError;
use prepdb_core::{CompositePreparer, DatabaseTemplate, ProviderIdentity};

type TemplateKey = (ProviderIdentity, CompositePreparer);

/// Process-wide template cache with get-or-create semantics.
///
/// At most one creation runs per key; concurrent callers for the same key
/// block on it and share its result. A failed creation is handed to every
/// waiter and is not cached, so the next caller tries again. Entries are
/// never evicted.
pub struct TemplateCache {
    templates: Cache<TemplateKey, Arc<DatabaseTemplate>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self {
            templates: Cache::builder().build(),
        }
    }

    pub fn get(
        &self,
        provider: &ProviderIdentity,
        preparer: &CompositePreparer,
    ) -> Option<Arc<DatabaseTemplate>> {
        self.templates.get(&(provider.clone(), preparer.clone()))
    }

    /// The cached template for the longest prefix of `preparer`, with the
    /// prefix length. Prefixes are probed from the full sequence down to
    /// the empty one.
    pub fn find_longest_prefix(
        &self,
        provider: &ProviderIdentity,
        preparer: &CompositePreparer,
    ) -> Option<(usize, Arc<DatabaseTemplate>)> {
        for len in (0..=preparer.len()).rev() {
            if let Some(template) = self.get(provider, &preparer.prefix(len)) {
                trace!(provider = %provider, prefix = len, steps = preparer.len(), "template prefix found");
                return Some((len, template));
            }
        }
        None
    }

    pub fn get_or_create<F>(
        &self,
        provider: &ProviderIdentity,
        preparer: &CompositePreparer,
        create: F,
    ) -> Result<Arc<DatabaseTemplate>, ProviderError>
    where
        F: FnOnce() -> Result<DatabaseTemplate, ProviderError>,
    {
        let key = (provider.clone(), preparer.clone());
        self.templates
            .try_get_with(key, || {
                debug!(provider = %provider, steps = preparer.len(), "creating template");
                create().map(Arc::new)
            })
            .map_err(ProviderError::from)
    }

    /// Number of cached templates.
    pub fn len(&self) -> u64 {
        self.templates.run_pending_tasks();
        self.templates.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TemplateCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TemplateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateCache")
            .field("templates", &self.templates.entry_count())
            .finish()
    }
}
