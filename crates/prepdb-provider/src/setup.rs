//! Setup-phase signal for the templating policy.
//!
//! While any context is still initializing, the templating provider
//! materializes a template for every full preparer it sees. Afterwards it
//! clones from the longest cached prefix and applies the rest directly.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::debug;

/// Returns `true` while the system is in its initial setup phase.
pub type SetupPhase = Arc<dyn Fn() -> bool + Send + Sync>;

/// A predicate that always reports steady state.
pub fn steady_state() -> SetupPhase {
    Arc::new(|| false)
}

/// A predicate that always reports the setup phase.
pub fn always_setup() -> SetupPhase {
    Arc::new(|| true)
}

/// Counts contexts that are still initializing.
#[derive(Debug, Default)]
pub struct SetupPhaseTracker {
    initializing: AtomicUsize,
}

impl SetupPhaseTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register one initializing context. The phase ends for it when the
    /// returned guard is finished or dropped.
    pub fn begin(self: &Arc<Self>) -> SetupGuard {
        let now = self.initializing.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(initializing = now, "context initializing");
        SetupGuard {
            tracker: Arc::clone(self),
            finished: false,
        }
    }

    pub fn initializing(&self) -> usize {
        self.initializing.load(Ordering::Acquire)
    }

    pub fn is_setup(&self) -> bool {
        self.initializing() > 0
    }

    /// The tracker as an injectable predicate.
    pub fn predicate(self: &Arc<Self>) -> SetupPhase {
        let tracker = Arc::clone(self);
        Arc::new(move || tracker.is_setup())
    }
}

/// One context's membership in the setup phase.
pub struct SetupGuard {
    tracker: Arc<SetupPhaseTracker>,
    finished: bool,
}

impl SetupGuard {
    pub fn finish(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.finished {
            self.finished = true;
            let now = self.tracker.initializing.fetch_sub(1, Ordering::AcqRel) - 1;
            debug!(initializing = now, "context ready");
        }
    }
}

impl Drop for SetupGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for SetupGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetupGuard")
            .field("finished", &self.finished)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicate_tracks_initializing_contexts() {
        let tracker = SetupPhaseTracker::new();
        let in_setup = tracker.predicate();
        assert!(!in_setup());

        let a = tracker.begin();
        let b = tracker.begin();
        assert!(in_setup());
        assert_eq!(tracker.initializing(), 2);

        a.finish();
        assert!(in_setup());
        drop(b);
        assert!(!in_setup());
        assert_eq!(tracker.initializing(), 0);
    }

    #[test]
    fn fixed_predicates() {
        assert!(always_setup()());
        assert!(!steady_state()());
    }
}
