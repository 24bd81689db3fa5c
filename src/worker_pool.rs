//! # Worker Pool Module
//!
//! Coroutine pools backing the pipeline stages.
//!
//! ## Features
//!
//! - **Worker Pools**: Spawn N worker coroutines per stage, all sharing one input queue
//! - **Unbounded Queues**: Stages talk over `may`'s unbounded MPSC channels
//! - **Load Balancing**: Workers pull from the shared receiver as they become free
//! - **Metrics**: Track runs, dispatches, completions and live coroutines for monitoring
//!
//! Every coroutine the pipeline spawns goes through [`spawn_task`], which counts it in
//! [`PipelineMetrics::get_live_tasks`] until its closure has been dropped. After
//! [`Client::run`](crate::Client::run) returns the count is back to where it was.

use crate::error::{BulkError, Stage};
use crate::ids::RunId;
use may::coroutine::JoinHandle;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Metrics shared by every run of a [`Client`](crate::Client)
#[derive(Debug)]
pub struct PipelineMetrics {
    /// Runs started
    pub runs: AtomicU64,
    /// Requests handed to the transport
    pub dispatched_count: AtomicU64,
    /// Raw outcomes finalized by the processing stage
    pub processed_count: AtomicU64,
    /// Finalized outcomes delivered by the collector
    pub collected_count: AtomicU64,
    /// Indices reported as ignored
    pub ignored_count: AtomicU64,
    /// Pipeline coroutines currently alive
    pub live_tasks: AtomicUsize,
}

impl PipelineMetrics {
    /// Create new metrics
    pub fn new() -> Self {
        Self {
            runs: AtomicU64::new(0),
            dispatched_count: AtomicU64::new(0),
            processed_count: AtomicU64::new(0),
            collected_count: AtomicU64::new(0),
            ignored_count: AtomicU64::new(0),
            live_tasks: AtomicUsize::new(0),
        }
    }

    pub fn record_run(&self) {
        self.runs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch(&self) {
        self.dispatched_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processed(&self) {
        self.processed_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_collected(&self, count: usize) {
        self.collected_count
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_ignored(&self, count: usize) {
        self.ignored_count.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn get_runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    pub fn get_dispatched_count(&self) -> u64 {
        self.dispatched_count.load(Ordering::Relaxed)
    }

    pub fn get_processed_count(&self) -> u64 {
        self.processed_count.load(Ordering::Relaxed)
    }

    pub fn get_collected_count(&self) -> u64 {
        self.collected_count.load(Ordering::Relaxed)
    }

    pub fn get_ignored_count(&self) -> u64 {
        self.ignored_count.load(Ordering::Relaxed)
    }

    /// Pipeline coroutines spawned and not yet finished
    pub fn get_live_tasks(&self) -> usize {
        self.live_tasks.load(Ordering::SeqCst)
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts one live coroutine; decrements when dropped
pub(crate) struct TaskGuard {
    metrics: Arc<PipelineMetrics>,
}

impl TaskGuard {
    pub(crate) fn new(metrics: Arc<PipelineMetrics>) -> Self {
        metrics.live_tasks.fetch_add(1, Ordering::SeqCst);
        Self { metrics }
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.metrics.live_tasks.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Spawn one pipeline coroutine, tracked in `metrics`
pub(crate) fn spawn_task<F, T>(
    stage: Stage,
    name: String,
    stack_size: usize,
    metrics: &Arc<PipelineMetrics>,
    f: F,
) -> Result<JoinHandle<T>, BulkError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let guard = TaskGuard::new(metrics.clone());

    // SAFETY: the closure owns everything it touches (channel ends, Arcs, the guard) and
    // never borrows from the spawning stack, so it may outlive the caller's frame.
    let spawned = unsafe {
        may::coroutine::Builder::new()
            .name(name)
            .stack_size(stack_size)
            .spawn(move || {
                let _guard = guard;
                f()
            })
    };

    spawned.map_err(|source| {
        error!(stage = %stage, error = %source, "Failed to spawn pipeline coroutine");
        BulkError::Spawn { stage, source }
    })
}

/// A fixed-size pool of coroutines running the same worker loop
pub(crate) struct WorkerPool {
    stage: Stage,
    run_id: RunId,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers, each calling `worker(worker_id)` once.
    ///
    /// On a spawn failure the workers already started are detached; they end as soon as the
    /// channels they hold are closed.
    pub(crate) fn spawn<F>(
        stage: Stage,
        size: usize,
        stack_size: usize,
        run_id: RunId,
        metrics: &Arc<PipelineMetrics>,
        worker: F,
    ) -> Result<Self, BulkError>
    where
        F: Fn(usize) + Send + Clone + 'static,
    {
        if size == 0 {
            return Err(BulkError::InvalidPoolSize { stage, size });
        }

        info!(
            run_id = %run_id,
            stage = %stage,
            num_workers = size,
            stack_size = stack_size,
            "Creating worker pool"
        );

        let mut handles = Vec::with_capacity(size);
        for worker_id in 0..size {
            let worker = worker.clone();
            let handle = spawn_task(
                stage,
                format!("bulk-{}-{}", stage, worker_id),
                stack_size,
                metrics,
                move || {
                    debug!(run_id = %run_id, stage = %stage, worker_id = worker_id, "Worker coroutine started");
                    worker(worker_id);
                    debug!(run_id = %run_id, stage = %stage, worker_id = worker_id, "Worker coroutine exiting");
                },
            )?;
            handles.push(handle);
        }

        Ok(Self {
            stage,
            run_id,
            handles,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker to exit. Returns the number of workers that panicked.
    pub(crate) fn join(self) -> usize {
        let mut panicked = 0;
        for (worker_id, handle) in self.handles.into_iter().enumerate() {
            if let Err(panic) = handle.join() {
                panicked += 1;
                error!(
                    run_id = %self.run_id,
                    stage = %self.stage,
                    worker_id = worker_id,
                    panic_message = %crate::pipeline::panic_message(panic.as_ref()),
                    "Worker coroutine panicked"
                );
            }
        }
        panicked
    }
}
