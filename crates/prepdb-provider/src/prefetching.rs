//! PrefetchingProvider: Databases prepared ahead of demand.
//!
//! Each (provider, preparer) key gets a pipeline: a request counter, the
//! prefetch tasks still outstanding, and a queue of finished results. A
//! request takes a ready result if there is one and always schedules a
//! replacement, so the buffer refills in the background. The first request
//! for a key also front-loads `pipeline_cache_size` extra tasks. Later
//! requests cancel queued background tasks and resubmit them with a
//! priority proportional to the demand seen so far.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{unbounded, Receiver, Sender};
use dashmap::DashMap;
use tracing::{debug, trace, warn};

use prepdb_core::config::PrefetchConfig;
use prepdb_core::errors::ProviderError;
use prepdb_core::traits::{Cancellable, TaskState};
use prepdb_core::{CompositePreparer, Database, DatabaseProvider, ProviderIdentity};

use crate::executor::{ExecutorJob, PriorityExecutor};

/// Priority of a task someone is already blocked on.
const URGENT: i64 = i64::MIN;
/// Priority of plain buffer replenishment.
const BACKGROUND: i64 = i64::MAX;
const PRIORITY_SCALE: i64 = 1000;

type PipelineKey = (ProviderIdentity, CompositePreparer);
type PrefetchResult = Result<Database, ProviderError>;

/// Urgency for the `rank`-th (1-based) extra task at `requests` demand.
/// Always negative, so it outranks background work and is never promoted
/// again.
fn scaled_priority(requests: u64, rank: usize) -> i64 {
    let requests = i64::try_from(requests).unwrap_or(i64::MAX);
    let rank = i64::try_from(rank.max(1)).unwrap_or(i64::MAX);
    (-(requests.saturating_mul(PRIORITY_SCALE) / rank)).min(-1)
}

struct Pipeline {
    preparer: CompositePreparer,
    requests: AtomicU64,
    tasks: Mutex<Vec<Arc<PrefetchTask>>>,
    results: Sender<PrefetchResult>,
    ready: Receiver<PrefetchResult>,
}

impl Pipeline {
    fn new(preparer: CompositePreparer) -> Self {
        let (results, ready) = unbounded();
        Self {
            preparer,
            requests: AtomicU64::new(0),
            tasks: Mutex::new(Vec::new()),
            results,
            ready,
        }
    }

    fn remove(&self, task: &PrefetchTask) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|t| !std::ptr::eq(Arc::as_ptr(t), task));
    }

    fn complete(&self, task: &PrefetchTask, result: PrefetchResult) {
        self.remove(task);
        // The receiver lives in this pipeline, so the send cannot fail.
        let _ = self.results.send(result);
    }
}

struct PrefetchTask {
    priority: i64,
    state: TaskState,
    pipeline: Arc<Pipeline>,
    provider: Arc<dyn DatabaseProvider>,
}

impl PrefetchTask {
    fn execute(&self) -> PrefetchResult {
        let preparer = &self.pipeline.preparer;
        panic::catch_unwind(AssertUnwindSafe(|| self.provider.create_database(preparer)))
            .unwrap_or_else(|payload| {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(ProviderError::Panicked(message))
            })
    }
}

struct PrefetchJob(Arc<PrefetchTask>);

impl ExecutorJob for PrefetchJob {
    fn run(self: Box<Self>) {
        let task = self.0;
        if !task.state.try_start() {
            // Cancelled while queued; the canceller already removed it.
            return;
        }
        let result = task.execute();
        task.state.finish();
        if let Err(e) = &result {
            warn!(priority = task.priority, error = %e, "prefetch task failed");
        } else {
            trace!(priority = task.priority, "prefetch task finished");
        }
        task.pipeline.complete(&task, result);
    }

    fn abandon(self: Box<Self>) {
        let task = self.0;
        if task.state.cancel() {
            task.pipeline.complete(&task, Err(ProviderError::Shutdown));
        }
    }
}

/// Prefetching layer over any provider.
///
/// All pipelines share one [`PriorityExecutor`]. Pipelines are created on
/// first use and live as long as the provider.
pub struct PrefetchingProvider {
    inner: Arc<dyn DatabaseProvider>,
    executor: PriorityExecutor,
    pipelines: DashMap<PipelineKey, Arc<Pipeline>>,
    pipeline_cache_size: usize,
}

impl PrefetchingProvider {
    pub fn new(
        inner: Arc<dyn DatabaseProvider>,
        config: &PrefetchConfig,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            inner,
            executor: PriorityExecutor::new(config.effective_thread_pool_size())?,
            pipelines: DashMap::new(),
            pipeline_cache_size: config.effective_pipeline_cache_size(),
        })
    }

    pub fn inner(&self) -> &Arc<dyn DatabaseProvider> {
        &self.inner
    }

    /// Results ready to be consumed for `preparer`.
    pub fn ready(&self, preparer: &CompositePreparer) -> usize {
        self.lookup(preparer).map_or(0, |p| p.ready.len())
    }

    /// Prefetch tasks queued or running for `preparer`.
    pub fn outstanding(&self, preparer: &CompositePreparer) -> usize {
        let Some(pipeline) = self.lookup(preparer) else {
            return 0;
        };
        let outstanding = pipeline
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        outstanding
    }

    /// Stop the workers. Queued tasks complete with `ProviderError::Shutdown`,
    /// running tasks finish normally.
    pub fn shutdown(&self) {
        self.executor.shutdown();
    }

    fn lookup(&self, preparer: &CompositePreparer) -> Option<Arc<Pipeline>> {
        let key = (self.inner.identity(), preparer.clone());
        self.pipelines.get(&key).map(|p| Arc::clone(p.value()))
    }

    fn pipeline(&self, preparer: &CompositePreparer) -> Arc<Pipeline> {
        let key = (self.inner.identity(), preparer.clone());
        if let Some(pipeline) = self.pipelines.get(&key) {
            return Arc::clone(pipeline.value());
        }
        let pipeline = self
            .pipelines
            .entry(key)
            .or_insert_with(|| Arc::new(Pipeline::new(preparer.clone())));
        Arc::clone(pipeline.value())
    }

    fn schedule(&self, pipeline: &Arc<Pipeline>, priority: i64) {
        let task = Arc::new(PrefetchTask {
            priority,
            state: TaskState::new(),
            pipeline: Arc::clone(pipeline),
            provider: Arc::clone(&self.inner),
        });
        pipeline
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&task));
        self.executor.submit(priority, Box::new(PrefetchJob(task)));
    }

    /// Cancel queued background tasks and resubmit them with urgency
    /// scaled by demand.
    fn promote(&self, pipeline: &Arc<Pipeline>, requests: u64) {
        let cancelled = {
            let mut tasks = pipeline.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            let before = tasks.len();
            tasks.retain(|task| !(task.priority >= 0 && task.state.cancel()));
            before - tasks.len()
        };
        if cancelled == 0 {
            return;
        }
        for rank in 1..=cancelled {
            self.schedule(pipeline, scaled_priority(requests, rank));
        }
        debug!(requests, promoted = cancelled, "prefetch tasks promoted");
    }
}

impl DatabaseProvider for PrefetchingProvider {
    fn identity(&self) -> ProviderIdentity {
        ProviderIdentity::new(format!("prefetching({})", self.inner.identity()))
    }

    fn create_database(&self, preparer: &CompositePreparer) -> Result<Database, ProviderError> {
        let pipeline = self.pipeline(preparer);
        let ready = pipeline.ready.try_recv().ok();

        self.schedule(&pipeline, if ready.is_some() { BACKGROUND } else { URGENT });

        let requests = pipeline.requests.fetch_add(1, Ordering::AcqRel) + 1;
        if requests == 1 {
            for rank in 1..=self.pipeline_cache_size {
                self.schedule(&pipeline, scaled_priority(requests, rank));
            }
            debug!(
                steps = preparer.len(),
                buffer = self.pipeline_cache_size,
                "prefetch pipeline started"
            );
        } else {
            self.promote(&pipeline, requests);
        }

        match ready {
            Some(result) => {
                trace!(requests, "prefetched database served");
                result
            }
            None => {
                trace!(requests, "waiting for prefetched database");
                pipeline.ready.recv().map_err(|_| ProviderError::Shutdown)?
            }
        }
    }
}

impl std::fmt::Debug for PrefetchingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefetchingProvider")
            .field("inner", &self.inner.identity())
            .field("pipelines", &self.pipelines.len())
            .field("pipeline_cache_size", &self.pipeline_cache_size)
            .field("executor", &self.executor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::{Duration, Instant};

    use prepdb_core::database::{AdmissionSemaphore, ConnectionSource};
    use prepdb_core::errors::EngineError;
    use prepdb_core::preparer::SqlScript;
    use prepdb_core::Step;
    use rusqlite::Connection;

    struct Nowhere;

    impl ConnectionSource for Nowhere {
        fn open(&self, database: &str) -> Result<Connection, EngineError> {
            Err(EngineError::UnknownDatabase(database.to_string()))
        }
    }

    /// Records which preparer each call was for. Calls for `blocker` wait
    /// for a gate token first.
    struct Gated {
        blocker: CompositePreparer,
        gate: Receiver<()>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl DatabaseProvider for Gated {
        fn identity(&self) -> ProviderIdentity {
            ProviderIdentity::new("gated")
        }

        fn create_database(&self, preparer: &CompositePreparer) -> PrefetchResult {
            let label = if *preparer == self.blocker { "blocker" } else { "target" };
            self.calls.lock().unwrap().push(label);
            if label == "blocker" {
                self.gate.recv().unwrap();
            }
            Ok(Database::new(label, Arc::new(Nowhere), AdmissionSemaphore::new(1)))
        }
    }

    fn preparer(sql: &str) -> CompositePreparer {
        CompositePreparer::from(Step::new(SqlScript::new(sql)))
    }

    fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn repeat_demand_promotes_queued_background_work() {
        let blocker = preparer("SELECT 'blocker'");
        let target = preparer("SELECT 'target'");
        let (open, gate) = crossbeam_channel::unbounded();
        let gated = Arc::new(Gated {
            blocker: blocker.clone(),
            gate,
            calls: Mutex::new(Vec::new()),
        });
        let config = PrefetchConfig {
            thread_pool_size: Some(1),
            pipeline_cache_size: Some(1),
        };
        let provider = Arc::new(PrefetchingProvider::new(gated.clone(), &config).unwrap());
        let calls = || gated.calls.lock().unwrap().clone();

        // Warm the target pipeline: one result consumed, one buffered.
        provider.create_database(&target).unwrap();
        wait_until("buffered target", || {
            provider.ready(&target) == 1 && provider.outstanding(&target) == 0
        });

        // Occupy the only worker; the blocker's buffer task stays queued.
        let waiter = {
            let provider = Arc::clone(&provider);
            let blocker = blocker.clone();
            thread::spawn(move || provider.create_database(&blocker).map(|_| ()))
        };
        wait_until("blocked worker", || {
            calls().len() == 3 && provider.executor.queued() == 1
        });

        // Served from the buffer: the replacement is scheduled as background
        // work, then promoted because this is repeat demand.
        provider.create_database(&target).unwrap();
        let pipeline = provider.lookup(&target).unwrap();
        let priorities: Vec<i64> = pipeline
            .tasks
            .lock()
            .unwrap()
            .iter()
            .map(|task| task.priority)
            .collect();
        assert_eq!(priorities, vec![scaled_priority(2, 1)]);
        // The cancelled background job is still in the heap until a worker
        // discards it.
        assert_eq!(provider.executor.queued(), 3);

        open.send(()).unwrap();
        open.send(()).unwrap();
        waiter.join().unwrap().unwrap();
        wait_until("drained executor", || {
            provider.executor.queued() == 0
                && provider.outstanding(&target) == 0
                && provider.outstanding(&blocker) == 0
        });

        // The promoted task overtook the blocker's earlier buffer task, and
        // the cancelled background task never reached the provider.
        assert_eq!(
            calls(),
            vec!["target", "target", "blocker", "target", "blocker"]
        );
        assert_eq!(provider.ready(&target), 1);
    }

    #[test]
    fn scaled_priorities_are_negative_and_descending() {
        assert_eq!(scaled_priority(1, 1), -1000);
        assert_eq!(scaled_priority(1, 2), -500);
        assert!(scaled_priority(1, 1) < scaled_priority(1, 3));
        assert!(scaled_priority(10, 1) < scaled_priority(2, 1));
        assert_eq!(scaled_priority(1, 5000), -1);
        assert_eq!(scaled_priority(u64::MAX, 1), i64::MIN + 1);
    }
}
