//! AdmissionSemaphore: Bounds concurrently open connections per engine.
//!
//! Permits are tokens in a bounded channel: acquiring receives a token
//! (blocking while none are left), releasing sends it back. A permit is an
//! RAII guard, so it is returned on every exit path, including panics and
//! errors while a connection is in use. There is no acquisition timeout.

use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::trace;

use crate::errors::EngineError;

/// Counting semaphore shared by every handle issued against one engine instance.
#[derive(Debug)]
pub struct AdmissionSemaphore {
    release: Sender<()>,
    acquire: Receiver<()>,
    capacity: usize,
}

impl AdmissionSemaphore {
    pub fn new(capacity: usize) -> Arc<Self> {
        let capacity = capacity.max(1);
        let (release, acquire) = bounded(capacity);
        for _ in 0..capacity {
            // The channel was sized for exactly `capacity` tokens.
            let _ = release.try_send(());
        }
        Arc::new(Self {
            release,
            acquire,
            capacity,
        })
    }

    /// Block until a permit is available.
    pub fn acquire(self: &Arc<Self>) -> Result<AdmissionPermit, EngineError> {
        self.acquire
            .recv()
            .map_err(|_| EngineError::AdmissionClosed)?;
        trace!(available = self.available(), "admission permit acquired");
        Ok(AdmissionPermit {
            semaphore: Arc::clone(self),
        })
    }

    /// Take a permit only if one is immediately available.
    pub fn try_acquire(self: &Arc<Self>) -> Option<AdmissionPermit> {
        self.acquire.try_recv().ok().map(|()| AdmissionPermit {
            semaphore: Arc::clone(self),
        })
    }

    /// Permits currently available.
    pub fn available(&self) -> usize {
        self.acquire.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// One admission slot. Released exactly once, on drop.
#[derive(Debug)]
pub struct AdmissionPermit {
    semaphore: Arc<AdmissionSemaphore>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        let _ = self.semaphore.release.try_send(());
        trace!(available = self.semaphore.available(), "admission permit released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn permits_are_bounded_and_returned() {
        let semaphore = AdmissionSemaphore::new(2);
        let a = semaphore.acquire().unwrap();
        let _b = semaphore.acquire().unwrap();
        assert_eq!(semaphore.available(), 0);
        assert!(semaphore.try_acquire().is_none());
        drop(a);
        assert_eq!(semaphore.available(), 1);
        assert!(semaphore.try_acquire().is_some());
        assert_eq!(semaphore.available(), 1);
    }

    #[test]
    fn acquire_blocks_until_release() {
        let semaphore = AdmissionSemaphore::new(1);
        let held = semaphore.acquire().unwrap();

        let (tx, rx) = crossbeam_channel::bounded(1);
        let waiter = {
            let semaphore = Arc::clone(&semaphore);
            std::thread::spawn(move || {
                let _permit = semaphore.acquire().unwrap();
                tx.send(()).unwrap();
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        drop(held);
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
        waiter.join().unwrap();
        assert_eq!(semaphore.available(), 1);
    }

    #[test]
    fn zero_capacity_is_clamped_to_one() {
        assert_eq!(AdmissionSemaphore::new(0).capacity(), 1);
    }
}
