//! # Client Module
//!
//! [`Client`] wires the pipeline stages together for one [`Batch`] at a time.
//!
//! ## Lifecycle of a run
//!
//! 1. every request is bound to the client's [`CancelScope`] and the output arrays are reset
//! 2. the processing pool, dispatch pool, collector, publisher and orchestrator are spawned
//! 3. the caller blocks until the collector delivers
//! 4. the stop signal is raised, results are written by index, unfinished indices are marked
//!    [`RequestError::Ignored`]
//! 5. the orchestrator is joined, so no pipeline coroutine outlives the call
//!
//! ## Example
//!
//! ```rust,no_run
//! use bulkhttp::{Batch, CancelScope, Client, HttpTransport, Request};
//! use std::time::Duration;
//!
//! let transport = HttpTransport::with_timeout(Duration::from_secs(1)).unwrap();
//! let client = Client::new(transport, CancelScope::new());
//!
//! let mut batch = Batch::new(
//!     vec![Request::get("http://127.0.0.1:8080/?kind=fast").unwrap()],
//!     20,
//!     20,
//! )
//! .unwrap();
//!
//! let (responses, errors) = client.run(&mut batch).unwrap();
//! for (response, error) in responses.iter_mut().zip(errors) {
//!     match (response, error) {
//!         (Some(response), _) => println!("{}", response.text().unwrap()),
//!         (_, Some(error)) => eprintln!("{}", error),
//!         _ => unreachable!(),
//!     }
//! }
//! batch.close();
//! ```

use crate::batch::Batch;
use crate::error::{BulkError, RequestError, Stage};
use crate::ids::RunId;
use crate::message::Response;
use crate::pipeline::collector;
use crate::pipeline::dispatch::DispatchWorker;
use crate::pipeline::orchestrator::Stages;
use crate::pipeline::process::ProcessWorker;
use crate::pipeline::{DispatchGate, FinalizedOutcome, StopSignal};
use crate::runtime_config::PipelineConfig;
use crate::scope::CancelScope;
use crate::transport::Transport;
use crate::worker_pool::{spawn_task, PipelineMetrics, WorkerPool};
use may::coroutine::JoinHandle;
use may::sync::{mpmc, mpsc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Runs batches against one transport under one cancellable scope
pub struct Client {
    transport: Arc<dyn Transport>,
    scope: CancelScope,
    config: PipelineConfig,
    metrics: Arc<PipelineMetrics>,
}

/// Coroutines a run waits on after launch
struct Running {
    collector: JoinHandle<Vec<FinalizedOutcome>>,
    orchestrator: JoinHandle<()>,
}

impl Client {
    pub fn new<T>(transport: T, scope: CancelScope) -> Self
    where
        T: Transport + 'static,
    {
        Self::from_shared(Arc::new(transport), scope)
    }

    /// Client over a transport shared with other clients
    pub fn from_shared(transport: Arc<dyn Transport>, scope: CancelScope) -> Self {
        Self {
            transport,
            scope,
            config: PipelineConfig::from_env(),
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn scope(&self) -> &CancelScope {
        &self.scope
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Execute every request of `batch` and return its output arrays, both of length
    /// `batch.len()`. For each index exactly one array holds a value.
    ///
    /// Fails with [`BulkError::RequestsNotFound`] on an empty batch, before anything is
    /// spawned or allocated.
    pub fn run<'b>(
        &self,
        batch: &'b mut Batch,
    ) -> Result<(&'b mut [Option<Response>], &'b [Option<RequestError>]), BulkError> {
        if batch.is_empty() {
            return Err(BulkError::RequestsNotFound);
        }

        let run_id = RunId::new();
        let started = Instant::now();
        let expected = batch.len();
        self.metrics.record_run();

        info!(
            run_id = %run_id,
            requests = expected,
            dispatch_workers = batch.dispatch_workers(),
            process_workers = batch.process_workers(),
            "Bulk run started"
        );

        batch.begin(&self.scope);
        let stop = StopSignal::default();

        let running = match self.launch(batch, run_id, &stop) {
            Ok(running) => running,
            Err(e) => {
                stop.raise();
                error!(run_id = %run_id, error = %e, "Failed to start pipeline");
                return Err(e);
            }
        };

        let collected = running.collector.join();
        stop.raise();

        let outcomes = match collected {
            Ok(outcomes) => outcomes,
            Err(panic) => {
                error!(
                    run_id = %run_id,
                    panic_message = %crate::pipeline::panic_message(panic.as_ref()),
                    "Collector panicked"
                );
                if running.orchestrator.join().is_err() {
                    warn!(run_id = %run_id, "Orchestrator panicked");
                }
                return Err(BulkError::CollectorLost);
            }
        };
        let delivered = outcomes.len();

        batch.record(outcomes);
        let unresolved = batch.fill_unresolved();
        if unresolved > 0 {
            warn!(
                run_id = %run_id,
                unresolved = unresolved,
                reason = ?self.scope.err(),
                "Run ended before every request finished"
            );
        }

        if running.orchestrator.join().is_err() {
            warn!(run_id = %run_id, "Orchestrator panicked");
        }

        let ignored = batch
            .errors()
            .iter()
            .flatten()
            .filter(|e| e.is_ignored())
            .count();
        self.metrics.record_ignored(ignored);

        info!(
            run_id = %run_id,
            requests = expected,
            delivered = delivered,
            ignored = ignored,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Bulk run finished"
        );

        Ok(batch.outputs())
    }

    /// Spawn every stage. On failure, whatever was already spawned winds down on its own
    /// once the channel ends held here are dropped.
    fn launch(&self, batch: &Batch, run_id: RunId, stop: &StopSignal) -> Result<Running, BulkError> {
        let stack_size = self.config.stack_size;
        let (request_tx, request_rx) = mpmc::channel();
        let (raw_tx, raw_rx) = mpmc::channel();
        let (finalized_tx, finalized_rx) = mpsc::channel();
        let gate = DispatchGate::default();

        let process_worker = ProcessWorker {
            run_id,
            scope: self.scope.clone(),
            input: raw_rx,
            output: finalized_tx.clone(),
            stop: stop.clone(),
            metrics: self.metrics.clone(),
        };
        let process = WorkerPool::spawn(
            Stage::Process,
            batch.process_workers(),
            stack_size,
            run_id,
            &self.metrics,
            move |worker_id| process_worker.run(worker_id),
        )?;

        let dispatch_worker = DispatchWorker {
            run_id,
            transport: self.transport.clone(),
            input: request_rx,
            gate: gate.clone(),
            output: raw_tx.clone(),
            stop: stop.clone(),
            metrics: self.metrics.clone(),
        };
        let dispatch = WorkerPool::spawn(
            Stage::Dispatch,
            batch.dispatch_workers(),
            stack_size,
            run_id,
            &self.metrics,
            move |worker_id| dispatch_worker.run(worker_id),
        )?;

        let expected = batch.len();
        let scope = self.scope.clone();
        let poll = self.config.collector_poll;
        let metrics = self.metrics.clone();
        let collector = spawn_task(
            Stage::Collect,
            format!("bulk-collect-{}", run_id),
            stack_size,
            &self.metrics,
            move || collector::collect(expected, &finalized_rx, &scope, poll, &metrics),
        )?;

        let publication = batch.publication();
        let publish_tx = request_tx.clone();
        let publish_stop = stop.clone();
        let publisher = spawn_task(
            Stage::Publish,
            format!("bulk-publish-{}", run_id),
            stack_size,
            &self.metrics,
            move || publication.publish(&publish_tx, &gate, &publish_stop),
        )?;

        let stages = Stages {
            run_id,
            publisher,
            request_tx,
            dispatch,
            raw_tx,
            process,
            finalized_tx,
        };
        let orchestrator = spawn_task(
            Stage::Orchestrate,
            format!("bulk-orchestrate-{}", run_id),
            stack_size,
            &self.metrics,
            move || stages.wind_down(),
        )?;

        Ok(Running {
            collector,
            orchestrator,
        })
    }
}
