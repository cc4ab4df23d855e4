//! Request and template value objects passed between provider layers.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::preparer::CompositePreparer;

/// One database creation request.
///
/// Exactly one creation mode applies: from scratch (no template) or cloned
/// from a template, in which case `preparer` holds only the complementary
/// steps still to run (possibly none).
#[derive(Debug, Clone, Default)]
pub struct DatabaseRequest {
    preparer: Option<CompositePreparer>,
    template: Option<Arc<DatabaseTemplate>>,
}

impl DatabaseRequest {
    /// Create a blank database and apply `preparer` to it.
    pub fn fresh(preparer: CompositePreparer) -> Self {
        Self {
            preparer: Some(preparer),
            template: None,
        }
    }

    /// Clone `template` and apply the `complement` steps to the copy.
    pub fn from_template(template: Arc<DatabaseTemplate>, complement: CompositePreparer) -> Self {
        Self {
            preparer: Some(complement),
            template: Some(template),
        }
    }

    pub fn preparer(&self) -> Option<&CompositePreparer> {
        self.preparer.as_ref()
    }

    pub fn template(&self) -> Option<&Arc<DatabaseTemplate>> {
        self.template.as_ref()
    }

    /// Whether any preparation step still has to run.
    pub fn has_pending_steps(&self) -> bool {
        self.preparer.as_ref().is_some_and(|p| !p.is_empty())
    }
}

type CloseFn = Box<dyn FnOnce(&str) + Send>;

/// A named database that other databases can be cloned from.
///
/// Closing a template retires it (typically dropping it from the engine).
/// Dropping the handle without closing leaves the template in place; its
/// lifetime is then bound to the engine instance that created it.
pub struct DatabaseTemplate {
    name: String,
    on_close: Mutex<Option<CloseFn>>,
}

impl DatabaseTemplate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            on_close: Mutex::new(None),
        }
    }

    pub fn with_close<F>(name: impl Into<String>, on_close: F) -> Self
    where
        F: FnOnce(&str) + Send + 'static,
    {
        Self {
            name: name.into(),
            on_close: Mutex::new(Some(Box::new(on_close))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Retire the template. Only the first call has an effect.
    pub fn close(&self) {
        let callback = match self.on_close.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(callback) = callback {
            callback(&self.name);
        }
    }
}

impl fmt::Debug for DatabaseTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseTemplate")
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn close_runs_callback_once() {
        let closed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&closed);
        let template = DatabaseTemplate::with_close("tpl", move |name| {
            assert_eq!(name, "tpl");
            counter.fetch_add(1, Ordering::SeqCst);
        });
        template.close();
        template.close();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn request_modes() {
        let fresh = DatabaseRequest::fresh(CompositePreparer::empty());
        assert!(fresh.template().is_none());
        assert!(!fresh.has_pending_steps());

        let cloned = DatabaseRequest::from_template(
            Arc::new(DatabaseTemplate::new("tpl")),
            CompositePreparer::empty(),
        );
        assert_eq!(cloned.template().map(|t| t.name()), Some("tpl"));
    }
}
