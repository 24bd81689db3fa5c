//! Staged wind-down of a running pipeline.

use super::{FinalizedOutcome, IndexedRequest, RawOutcome};
use crate::ids::RunId;
use crate::worker_pool::WorkerPool;
use may::coroutine::JoinHandle;
use may::sync::{mpmc, mpsc};
use tracing::{debug, warn};

/// The running stages plus the original sender of every channel between them
pub(crate) struct Stages {
    pub run_id: RunId,
    pub publisher: JoinHandle<usize>,
    pub request_tx: mpmc::Sender<IndexedRequest>,
    pub dispatch: WorkerPool,
    pub raw_tx: mpmc::Sender<RawOutcome>,
    pub process: WorkerPool,
    pub finalized_tx: mpsc::Sender<FinalizedOutcome>,
}

impl Stages {
    /// Close the pipeline one stage at a time:
    ///
    /// 1. wait for the publisher, then close the dispatch queue
    /// 2. wait for every dispatch worker, then close the raw-outcome queue
    /// 3. wait for every processing worker, then close the finalized-outcome queue
    pub(crate) fn wind_down(self) {
        let Stages {
            run_id,
            publisher,
            request_tx,
            dispatch,
            raw_tx,
            process,
            finalized_tx,
        } = self;

        match publisher.join() {
            Ok(published) => debug!(run_id = %run_id, published = published, "Publisher finished"),
            Err(panic) => warn!(
                run_id = %run_id,
                panic_message = %super::panic_message(panic.as_ref()),
                "Publisher panicked"
            ),
        }
        drop(request_tx);

        let workers = dispatch.len();
        let panicked = dispatch.join();
        drop(raw_tx);
        debug!(run_id = %run_id, workers = workers, panicked = panicked, "Dispatch stage closed");

        let workers = process.len();
        let panicked = process.join();
        drop(finalized_tx);
        debug!(run_id = %run_id, workers = workers, panicked = panicked, "Process stage closed");
    }
}
