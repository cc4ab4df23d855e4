//! Best-effort cancellation for queued work.

use std::sync::atomic::{AtomicU8, Ordering};

/// Work that can be cancelled before it starts.
pub trait Cancellable {
    /// Check if cancellation has been requested and won.
    fn is_cancelled(&self) -> bool;

    /// Request cancellation. Returns `true` only if the work had not started
    /// yet and will now never run.
    fn cancel(&self) -> bool;
}

const QUEUED: u8 = 0;
const RUNNING: u8 = 1;
const DONE: u8 = 2;
const CANCELLED: u8 = 3;

/// Lock-free lifecycle of a queued task: queued -> running -> done, or
/// queued -> cancelled. Running work is never interrupted.
#[derive(Debug)]
pub struct TaskState {
    state: AtomicU8,
}

impl TaskState {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(QUEUED),
        }
    }

    /// Claim the task for execution. Fails if it was cancelled or already claimed.
    pub fn try_start(&self) -> bool {
        self.state
            .compare_exchange(QUEUED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn finish(&self) {
        self.state.store(DONE, Ordering::Release);
    }

    pub fn is_queued(&self) -> bool {
        self.state.load(Ordering::Acquire) == QUEUED
    }

    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }

    pub fn is_done(&self) -> bool {
        self.state.load(Ordering::Acquire) == DONE
    }
}

impl Default for TaskState {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancellable for TaskState {
    fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }

    fn cancel(&self) -> bool {
        self.state
            .compare_exchange(QUEUED, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
