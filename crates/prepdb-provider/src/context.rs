//! DatabaseContext: The swappable database a test holds.
//!
//! The context owns a base preparer and provisions databases for it (or for
//! the base plus steps added with [`DatabaseContext::apply`]) on demand.
//! Swapping in a new database releases the context's reference to the old
//! one; the old database is dropped once every other holder has let go.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use prepdb_core::errors::ProviderError;
use prepdb_core::{CompositePreparer, Database, DatabaseProvider, GuardedConnection, Step};

use crate::setup::{SetupGuard, SetupPhaseTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Still part of the setup phase.
    Initializing,
    /// Holds (or will lazily provision) a database for the base preparer.
    Fresh,
    /// Extra steps were applied on top of the base preparer.
    Dirty,
    Closed,
}

struct Inner {
    state: ContextState,
    base: CompositePreparer,
    preparer: CompositePreparer,
    database: Option<Arc<Database>>,
    setup: Option<SetupGuard>,
}

pub struct DatabaseContext {
    provider: Arc<dyn DatabaseProvider>,
    inner: Mutex<Inner>,
}

impl DatabaseContext {
    /// A context in the `Initializing` state, registered with `tracker`
    /// until [`mark_ready`](Self::mark_ready) or [`close`](Self::close).
    pub fn new(
        provider: Arc<dyn DatabaseProvider>,
        base: CompositePreparer,
        tracker: &Arc<SetupPhaseTracker>,
    ) -> Self {
        Self {
            provider,
            inner: Mutex::new(Inner {
                state: ContextState::Initializing,
                preparer: base.clone(),
                base,
                database: None,
                setup: Some(tracker.begin()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ContextState {
        self.lock().state
    }

    /// The preparer the current database was (or will be) built with.
    pub fn preparer(&self) -> CompositePreparer {
        self.lock().preparer.clone()
    }

    /// The current database, provisioned on first use.
    pub fn database(&self) -> Result<Arc<Database>, ProviderError> {
        let mut inner = self.lock();
        if inner.state == ContextState::Closed {
            return Err(ProviderError::ContextClosed);
        }
        if let Some(database) = &inner.database {
            return Ok(Arc::clone(database));
        }
        let database = Arc::new(self.provider.create_database(&inner.preparer)?);
        inner.database = Some(Arc::clone(&database));
        Ok(database)
    }

    /// Append `step` to the current preparer and swap in a database built
    /// for the extended sequence.
    pub fn apply(&self, step: impl Into<Step>) -> Result<Arc<Database>, ProviderError> {
        let mut inner = self.lock();
        if inner.state == ContextState::Closed {
            return Err(ProviderError::ContextClosed);
        }
        let preparer = inner.preparer.then(step);
        let database = self.swap(&mut inner, preparer)?;
        if inner.state != ContextState::Initializing {
            inner.state = ContextState::Dirty;
        }
        Ok(database)
    }

    /// Return to the base preparer with a fresh database.
    pub fn reset(&self) -> Result<Arc<Database>, ProviderError> {
        let mut inner = self.lock();
        if inner.state == ContextState::Closed {
            return Err(ProviderError::ContextClosed);
        }
        let base = inner.base.clone();
        let database = self.swap(&mut inner, base)?;
        if inner.state == ContextState::Dirty {
            inner.state = ContextState::Fresh;
        }
        Ok(database)
    }

    /// An admission-guarded connection to the current database.
    pub fn connection(&self) -> Result<GuardedConnection, ProviderError> {
        Ok(self.database()?.connection()?)
    }

    /// Leave the setup phase. Steps applied before this call become part of
    /// the context's base preparer.
    pub fn mark_ready(&self) {
        let mut inner = self.lock();
        if inner.state != ContextState::Initializing {
            return;
        }
        if let Some(setup) = inner.setup.take() {
            setup.finish();
        }
        inner.base = inner.preparer.clone();
        inner.state = ContextState::Fresh;
        debug!(steps = inner.preparer.len(), "database context ready");
    }

    /// The preparer `reset` returns to.
    pub fn base(&self) -> CompositePreparer {
        self.lock().base.clone()
    }

    /// Release the current database and refuse further use.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.state = ContextState::Closed;
        inner.database = None;
        inner.setup = None;
    }

    fn swap(
        &self,
        inner: &mut Inner,
        preparer: CompositePreparer,
    ) -> Result<Arc<Database>, ProviderError> {
        let database = Arc::new(self.provider.create_database(&preparer)?);
        if let Some(old) = inner.database.replace(Arc::clone(&database)) {
            debug!(
                old = old.name(),
                new = database.name(),
                steps = preparer.len(),
                "database swapped"
            );
        }
        inner.preparer = preparer;
        Ok(database)
    }
}

impl fmt::Debug for DatabaseContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("DatabaseContext")
            .field("state", &inner.state)
            .field("steps", &inner.preparer.len())
            .field("database", &inner.database.as_ref().map(|d| d.name().to_string()))
            .finish()
    }
}
