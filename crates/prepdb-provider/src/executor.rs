//! PriorityExecutor: A fixed pool of worker threads draining one shared
//! priority queue.
//!
//! Lower priority values run sooner; equal priorities run in submission
//! order. Jobs that are still queued at shutdown are abandoned rather than
//! run, so their owners can report a shutdown to whoever waits on them.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, trace};

use prepdb_core::errors::ProviderError;

/// Unit of work accepted by the executor.
pub trait ExecutorJob: Send + 'static {
    fn run(self: Box<Self>);

    /// Called instead of `run` when the executor shuts down first.
    fn abandon(self: Box<Self>);
}

struct Queued {
    priority: i64,
    seq: u64,
    job: Box<dyn ExecutorJob>,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    // BinaryHeap pops the greatest element: invert both keys.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<Queued>,
    next_seq: u64,
    shutdown: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct PriorityExecutor {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    threads: usize,
}

impl PriorityExecutor {
    /// Start `threads` workers (at least one).
    pub fn new(threads: usize) -> Result<Self, ProviderError> {
        let threads = threads.max(1);
        let shared = Arc::new(Shared::default());
        let executor = Self {
            shared: Arc::clone(&shared),
            workers: Mutex::new(Vec::with_capacity(threads)),
            threads,
        };
        for index in 0..threads {
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("prepdb-prefetch-{index}"))
                .spawn(move || worker_loop(&shared))
                .map_err(ProviderError::WorkerSpawn)?;
            executor
                .workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(handle);
        }
        debug!(threads, "prefetch executor started");
        Ok(executor)
    }

    /// Queue `job`. After shutdown the job is abandoned immediately and
    /// `false` is returned.
    pub fn submit(&self, priority: i64, job: Box<dyn ExecutorJob>) -> bool {
        let mut state = self.shared.lock();
        if state.shutdown {
            drop(state);
            job.abandon();
            return false;
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(Queued { priority, seq, job });
        trace!(priority, seq, queued = state.heap.len(), "job submitted");
        drop(state);
        self.shared.available.notify_one();
        true
    }

    /// Jobs waiting for a worker. Includes jobs whose owners have since
    /// cancelled them.
    pub fn queued(&self) -> usize {
        self.shared.lock().heap.len()
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Stop accepting work, abandon queued jobs, and wait for running jobs
    /// to finish. Idempotent.
    pub fn shutdown(&self) {
        let abandoned: Vec<Queued> = {
            let mut state = self.shared.lock();
            if state.shutdown {
                Vec::new()
            } else {
                state.shutdown = true;
                state.heap.drain().collect()
            }
        };
        self.shared.available.notify_all();
        if !abandoned.is_empty() {
            debug!(abandoned = abandoned.len(), "abandoning queued prefetch jobs");
        }
        for queued in abandoned {
            queued.job.abandon();
        }

        let workers: Vec<JoinHandle<()>> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        let current = thread::current().id();
        for worker in workers {
            // A job dropping the last owner of the executor must not join itself.
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                error!("prefetch worker panicked");
            }
        }
    }
}

impl Drop for PriorityExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for PriorityExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityExecutor")
            .field("threads", &self.threads)
            .field("queued", &self.queued())
            .finish()
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let queued = {
            let mut state = shared.lock();
            loop {
                if state.shutdown {
                    return;
                }
                if let Some(queued) = state.heap.pop() {
                    break queued;
                }
                state = shared
                    .available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };
        trace!(priority = queued.priority, seq = queued.seq, "job started");
        queued.job.run();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    struct Record {
        label: i64,
        log: mpsc::Sender<i64>,
        gate: Option<mpsc::Receiver<()>>,
    }

    impl ExecutorJob for Record {
        fn run(self: Box<Self>) {
            if let Some(gate) = &self.gate {
                let _ = gate.recv();
            }
            let _ = self.log.send(self.label);
        }

        fn abandon(self: Box<Self>) {
            let _ = self.log.send(-self.label);
        }
    }

    fn job(label: i64, log: &mpsc::Sender<i64>) -> Box<dyn ExecutorJob> {
        Box::new(Record {
            label,
            log: log.clone(),
            gate: None,
        })
    }

    /// Occupy the single worker until the returned sender fires.
    fn block_worker(executor: &PriorityExecutor, log: &mpsc::Sender<i64>) -> mpsc::Sender<()> {
        let (open, gate) = mpsc::channel();
        executor.submit(
            i64::MIN,
            Box::new(Record {
                label: 0,
                log: log.clone(),
                gate: Some(gate),
            }),
        );
        // Wait until the worker has taken the blocking job.
        while executor.queued() > 0 {
            thread::sleep(Duration::from_millis(1));
        }
        open
    }

    #[test]
    fn lower_priority_runs_first_then_fifo() {
        let executor = PriorityExecutor::new(1).unwrap();
        let (log, results) = mpsc::channel();
        let open = block_worker(&executor, &log);

        executor.submit(10, job(1, &log));
        executor.submit(-5, job(2, &log));
        executor.submit(10, job(3, &log));
        executor.submit(i64::MIN, job(4, &log));
        open.send(()).unwrap();

        let order: Vec<i64> = (0..5)
            .map(|_| results.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(order, vec![0, 4, 2, 1, 3]);
    }

    #[test]
    fn shutdown_abandons_queued_jobs() {
        let executor = PriorityExecutor::new(1).unwrap();
        let (log, results) = mpsc::channel();
        let open = block_worker(&executor, &log);
        executor.submit(1, job(7, &log));

        let closer = thread::spawn(move || executor.shutdown());
        assert_eq!(results.recv_timeout(Duration::from_secs(5)).unwrap(), -7);
        open.send(()).unwrap();
        assert_eq!(results.recv_timeout(Duration::from_secs(5)).unwrap(), 0);
        closer.join().unwrap();
    }

    #[test]
    fn submit_after_shutdown_abandons() {
        let executor = PriorityExecutor::new(2).unwrap();
        executor.shutdown();
        let (log, results) = mpsc::channel();
        assert!(!executor.submit(0, job(3, &log)));
        assert_eq!(results.recv().unwrap(), -3);
    }
}
