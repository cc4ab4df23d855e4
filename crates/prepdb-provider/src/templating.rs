//! TemplatingProvider: Longest-prefix template reuse.
//!
//! For a preparer of N steps the cache is probed for prefixes N, N-1, ..., 0.
//! What happens next depends on the match and the setup phase:
//!
//! - full match, or steady state: clone the matched template and run the
//!   remaining steps on the clone. Nothing new is cached.
//! - partial match during setup: clone the matched template into a new
//!   template for the full sequence, cache it, and clone from that.
//! - no match: build a template for the full sequence from scratch, cache
//!   it, and clone from that.

use std::sync::Arc;

use tracing::{debug, info};

use prepdb_core::errors::ProviderError;
use prepdb_core::{
    CompositePreparer, Database, DatabaseProvider, DatabaseRequest, DatabaseTemplate,
    ProviderIdentity, TemplatableProvider,
};

use crate::setup::{self, SetupPhase};
use crate::template_cache::TemplateCache;

pub struct TemplatingProvider {
    inner: Arc<dyn TemplatableProvider>,
    cache: Arc<TemplateCache>,
    setup_phase: SetupPhase,
}

impl TemplatingProvider {
    /// A templating layer over `inner` that assumes steady state.
    pub fn new(inner: Arc<dyn TemplatableProvider>, cache: Arc<TemplateCache>) -> Self {
        Self {
            inner,
            cache,
            setup_phase: setup::steady_state(),
        }
    }

    pub fn with_setup_phase(mut self, setup_phase: SetupPhase) -> Self {
        self.setup_phase = setup_phase;
        self
    }

    pub fn inner(&self) -> &Arc<dyn TemplatableProvider> {
        &self.inner
    }

    pub fn cache(&self) -> &Arc<TemplateCache> {
        &self.cache
    }

    fn clone_from(
        &self,
        template: Arc<DatabaseTemplate>,
        complement: CompositePreparer,
    ) -> Result<Database, ProviderError> {
        self.inner
            .create_database_from(DatabaseRequest::from_template(template, complement))
    }

    fn template_for(
        &self,
        identity: &ProviderIdentity,
        preparer: &CompositePreparer,
        request: DatabaseRequest,
    ) -> Result<Arc<DatabaseTemplate>, ProviderError> {
        self.cache.get_or_create(identity, preparer, || {
            let template = self.inner.create_template(request)?;
            info!(
                provider = %identity,
                template = template.name(),
                steps = preparer.len(),
                "template created"
            );
            Ok(template)
        })
    }
}

impl DatabaseProvider for TemplatingProvider {
    fn identity(&self) -> ProviderIdentity {
        ProviderIdentity::new(format!("templating({})", self.inner.identity()))
    }

    fn create_database(&self, preparer: &CompositePreparer) -> Result<Database, ProviderError> {
        let identity = self.inner.identity();
        let steps = preparer.len();

        match self.cache.find_longest_prefix(&identity, preparer) {
            Some((matched, template)) if matched == steps || !(self.setup_phase)() => {
                debug!(provider = %identity, matched, steps, "cloning cached template");
                self.clone_from(template, preparer.suffix(matched))
            }
            Some((matched, base)) => {
                debug!(
                    provider = %identity,
                    matched,
                    steps,
                    "extending cached template during setup"
                );
                let template = self.template_for(
                    &identity,
                    preparer,
                    DatabaseRequest::from_template(base, preparer.suffix(matched)),
                )?;
                self.clone_from(template, CompositePreparer::empty())
            }
            None => {
                let template = self.template_for(
                    &identity,
                    preparer,
                    DatabaseRequest::fresh(preparer.clone()),
                )?;
                self.clone_from(template, CompositePreparer::empty())
            }
        }
    }
}

impl TemplatableProvider for TemplatingProvider {
    fn create_database_from(&self, request: DatabaseRequest) -> Result<Database, ProviderError> {
        self.inner.create_database_from(request)
    }

    fn create_template(&self, request: DatabaseRequest) -> Result<DatabaseTemplate, ProviderError> {
        self.inner.create_template(request)
    }
}

impl std::fmt::Debug for TemplatingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplatingProvider")
            .field("inner", &self.inner.identity())
            .field("cache", &self.cache)
            .finish()
    }
}
