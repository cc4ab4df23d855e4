//! The opaque preparation step and its cache-key wrapper.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rusqlite::Connection;

use super::StepDescriptor;
use crate::errors::PreparationError;

/// An opaque unit of database setup applied to a raw connection.
///
/// Implementations that return a descriptor compare by value; all others
/// compare by identity (the allocation they live in).
pub trait PreparationStep: Send + Sync + fmt::Debug {
    /// Apply this step to the database behind `conn`.
    fn apply(&self, conn: &Connection) -> Result<(), PreparationError>;

    /// Immutable snapshot of the step's settings, if it is value-comparable.
    fn descriptor(&self) -> Option<StepDescriptor> {
        None
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
enum StepKey {
    Value(StepDescriptor),
    Identity(usize),
}

/// A shared, hashable handle to a [`PreparationStep`].
///
/// The key is computed once at construction, so equality never re-reads
/// the step's settings.
#[derive(Clone)]
pub struct Step {
    inner: Arc<dyn PreparationStep>,
    key: StepKey,
}

impl Step {
    pub fn new(step: impl PreparationStep + 'static) -> Self {
        Self::from_arc(Arc::new(step))
    }

    pub fn from_arc(inner: Arc<dyn PreparationStep>) -> Self {
        let key = match inner.descriptor() {
            Some(descriptor) => StepKey::Value(descriptor),
            None => StepKey::Identity(Arc::as_ptr(&inner) as *const () as usize),
        };
        Self { inner, key }
    }

    pub fn apply(&self, conn: &Connection) -> Result<(), PreparationError> {
        self.inner.apply(conn)
    }

    pub fn descriptor(&self) -> Option<&StepDescriptor> {
        match &self.key {
            StepKey::Value(descriptor) => Some(descriptor),
            StepKey::Identity(_) => None,
        }
    }

    /// Short label for logging.
    pub fn label(&self) -> String {
        match &self.key {
            StepKey::Value(descriptor) => descriptor.to_string(),
            StepKey::Identity(addr) => format!("step@{addr:x}"),
        }
    }
}

impl PartialEq for Step {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Step {}

impl Hash for Step {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            StepKey::Value(descriptor) => write!(f, "Step({descriptor:?})"),
            StepKey::Identity(_) => write!(f, "Step({:?})", self.inner),
        }
    }
}

impl<T: PreparationStep + 'static> From<T> for Step {
    fn from(step: T) -> Self {
        Self::new(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Noop;

    impl PreparationStep for Noop {
        fn apply(&self, _conn: &Connection) -> Result<(), PreparationError> {
            Ok(())
        }
    }

    #[derive(Debug)]
    struct Valued(u32);

    impl PreparationStep for Valued {
        fn apply(&self, _conn: &Connection) -> Result<(), PreparationError> {
            Ok(())
        }

        fn descriptor(&self) -> Option<StepDescriptor> {
            Some(StepDescriptor::builder("valued").param("n", self.0).build())
        }
    }

    #[test]
    fn identity_steps_equal_only_to_their_clones() {
        let a = Step::new(Noop);
        let b = Step::new(Noop);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert!(a.descriptor().is_none());
    }

    #[test]
    fn value_steps_equal_across_allocations() {
        assert_eq!(Step::new(Valued(1)), Step::new(Valued(1)));
        assert_ne!(Step::new(Valued(1)), Step::new(Valued(2)));
        assert_eq!(Step::new(Valued(7)).label(), "valued(n)");
    }
}
