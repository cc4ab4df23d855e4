//! CompositePreparer: An ordered, immutable sequence of steps.
//!
//! Equality and hashing are structural over the sequence (order matters),
//! which makes a composite preparer usable directly as a cache key. Any
//! prefix of a composite preparer is itself a composite preparer.

use std::fmt;
use std::sync::Arc;

use rusqlite::Connection;
use tracing::trace;

use super::Step;
use crate::errors::PreparationError;

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CompositePreparer {
    steps: Arc<[Step]>,
}

impl CompositePreparer {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
        }
    }

    /// The preparer with no steps (a blank database).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// The first `len` steps. `len` is clamped to the sequence length.
    pub fn prefix(&self, len: usize) -> Self {
        let len = len.min(self.steps.len());
        if len == self.steps.len() {
            return self.clone();
        }
        Self::new(self.steps[..len].iter().cloned())
    }

    /// The steps from index `from` onwards (the complement of `prefix(from)`).
    pub fn suffix(&self, from: usize) -> Self {
        let from = from.min(self.steps.len());
        if from == 0 {
            return self.clone();
        }
        Self::new(self.steps[from..].iter().cloned())
    }

    /// A new preparer with `step` appended.
    pub fn then(&self, step: impl Into<Step>) -> Self {
        Self::new(self.steps.iter().cloned().chain(std::iter::once(step.into())))
    }

    /// A new preparer with all steps of `other` appended.
    pub fn concat(&self, other: &CompositePreparer) -> Self {
        Self::new(self.steps.iter().chain(other.steps.iter()).cloned())
    }

    /// Whether `self` is a prefix of `other`.
    pub fn is_prefix_of(&self, other: &CompositePreparer) -> bool {
        other.steps.len() >= self.steps.len() && other.steps[..self.steps.len()] == *self.steps
    }

    /// Apply every step in order, stopping at the first failure.
    pub fn apply(&self, conn: &Connection) -> Result<(), PreparationError> {
        for (index, step) in self.steps.iter().enumerate() {
            trace!(index, step = %step.label(), "applying preparation step");
            step.apply(conn)?;
        }
        Ok(())
    }
}

impl fmt::Debug for CompositePreparer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.steps.iter()).finish()
    }
}

impl Default for CompositePreparer {
    fn default() -> Self {
        Self {
            steps: Arc::from(Vec::new()),
        }
    }
}

impl FromIterator<Step> for CompositePreparer {
    fn from_iter<I: IntoIterator<Item = Step>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl From<Step> for CompositePreparer {
    fn from(step: Step) -> Self {
        Self::new([step])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preparer::SqlScript;

    fn sql(text: &str) -> Step {
        Step::new(SqlScript::new(text))
    }

    #[test]
    fn order_matters_for_equality() {
        let a = sql("CREATE TABLE a (id INTEGER)");
        let b = sql("CREATE TABLE b (id INTEGER)");
        let ab = CompositePreparer::new([a.clone(), b.clone()]);
        let ba = CompositePreparer::new([b, a]);
        assert_ne!(ab, ba);
    }

    #[test]
    fn prefix_and_suffix_partition_the_sequence() {
        let p = CompositePreparer::new([sql("SELECT 1"), sql("SELECT 2"), sql("SELECT 3")]);
        for i in 0..=p.len() {
            assert_eq!(p.prefix(i).concat(&p.suffix(i)), p);
            assert!(p.prefix(i).is_prefix_of(&p));
        }
        assert_eq!(p.prefix(10), p);
        assert!(p.suffix(10).is_empty());
        assert_eq!(p.prefix(0), CompositePreparer::empty());
    }

    #[test]
    fn then_appends_one_step() {
        let base = CompositePreparer::from(sql("SELECT 1"));
        let extended = base.then(sql("SELECT 2"));
        assert_eq!(extended.len(), 2);
        assert!(base.is_prefix_of(&extended));
        assert!(!extended.is_prefix_of(&base));
    }

    #[test]
    fn apply_runs_steps_in_order() {
        let conn = Connection::open_in_memory().unwrap();
        let p = CompositePreparer::new([
            sql("CREATE TABLE t (id INTEGER)"),
            sql("INSERT INTO t VALUES (1)"),
        ]);
        p.apply(&conn).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
