//! # Batch Module
//!
//! A [`Batch`] is the unit of work for [`Client::run`](crate::Client::run): an ordered list of
//! requests, the pool sizes to run them with, and two output arrays of the same length that
//! the run fills by index.
//!
//! After a completed run every index holds exactly one of:
//!
//! - `responses[i]`: a response with a buffered, re-readable body
//! - `errors[i]`: why index `i` has no usable response
//!
//! Output arrays are reallocated at the start of every run; bodies left open by the previous
//! run are closed first. Call [`Batch::close`] when done with the responses.
//!
//! ```rust
//! use bulkhttp::{Batch, Request};
//!
//! let requests = vec![
//!     Request::get("http://127.0.0.1:8080/?kind=slow").unwrap(),
//!     Request::get("http://127.0.0.1:8080/?kind=fast").unwrap(),
//! ];
//! let batch = Batch::new(requests, 2, 2).unwrap();
//! assert_eq!(batch.len(), 2);
//! assert!(batch.responses().is_empty());
//! ```

use crate::error::{BulkError, RequestError, Stage};
use crate::message::{Request, Response};
use crate::pipeline::{DispatchGate, FinalizedOutcome, IndexedRequest, StopSignal};
use crate::runtime_config::PipelineConfig;
use crate::scope::CancelScope;
use may::sync::mpmc::Sender;
use tracing::warn;

/// Ordered requests plus the output arrays a run fills by index
#[derive(Debug)]
pub struct Batch {
    requests: Vec<Request>,
    responses: Vec<Option<Response>>,
    errors: Vec<Option<RequestError>>,
    dispatch_workers: usize,
    process_workers: usize,
}

impl Batch {
    /// Create a batch run by `dispatch_workers` transport callers and `process_workers`
    /// body readers. Both must be at least one.
    pub fn new(
        requests: Vec<Request>,
        dispatch_workers: usize,
        process_workers: usize,
    ) -> Result<Self, BulkError> {
        if dispatch_workers == 0 {
            return Err(BulkError::InvalidPoolSize {
                stage: Stage::Dispatch,
                size: dispatch_workers,
            });
        }
        if process_workers == 0 {
            return Err(BulkError::InvalidPoolSize {
                stage: Stage::Process,
                size: process_workers,
            });
        }

        Ok(Self {
            requests,
            responses: Vec::new(),
            errors: Vec::new(),
            dispatch_workers,
            process_workers,
        })
    }

    /// Create a batch with the pool sizes from `config`
    pub fn from_config(requests: Vec<Request>, config: &PipelineConfig) -> Result<Self, BulkError> {
        Self::new(requests, config.dispatch_workers, config.process_workers)
    }

    /// Append a request; it takes part in the next run
    pub fn add_request(&mut self, request: Request) {
        self.requests.push(request);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    #[must_use]
    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    /// Responses of the last run; empty before the first run
    #[must_use]
    pub fn responses(&self) -> &[Option<Response>] {
        &self.responses
    }

    pub fn responses_mut(&mut self) -> &mut [Option<Response>] {
        &mut self.responses
    }

    /// Errors of the last run; empty before the first run
    #[must_use]
    pub fn errors(&self) -> &[Option<RequestError>] {
        &self.errors
    }

    #[must_use]
    pub fn dispatch_workers(&self) -> usize {
        self.dispatch_workers
    }

    #[must_use]
    pub fn process_workers(&self) -> usize {
        self.process_workers
    }

    /// Close every open response body. Safe to call repeatedly and on partially filled
    /// arrays. Returns the number of bodies this call closed.
    pub fn close(&mut self) -> usize {
        self.responses
            .iter_mut()
            .flatten()
            .map(|response| usize::from(response.close()))
            .sum()
    }

    /// Bind every request to `scope` and allocate fresh output arrays
    pub(crate) fn begin(&mut self, scope: &CancelScope) {
        self.close();
        for request in &mut self.requests {
            *request = request.with_scope(scope.clone());
        }
        let len = self.requests.len();
        self.responses = std::iter::repeat_with(|| None).take(len).collect();
        self.errors = vec![None; len];
    }

    /// Snapshot of the requests for the publisher
    pub(crate) fn publication(&self) -> Publication {
        Publication {
            requests: self.requests.clone(),
        }
    }

    /// Write delivered outcomes into their slots. Each slot is written at most once; a
    /// duplicate or out-of-range outcome is released and dropped.
    pub(crate) fn record(&mut self, outcomes: Vec<FinalizedOutcome>) {
        for mut outcome in outcomes {
            let index = outcome.index;
            let vacant = index < self.len()
                && self.responses[index].is_none()
                && self.errors[index].is_none();
            if !vacant {
                warn!(index = index, len = self.len(), "Discarding unexpected outcome");
                outcome.release();
                continue;
            }
            match outcome.result {
                Ok(response) => self.responses[index] = Some(response),
                Err(err) => self.errors[index] = Some(err),
            }
        }
    }

    /// Mark every index with neither a response nor an error as ignored.
    /// Returns the number of indices filled.
    pub(crate) fn fill_unresolved(&mut self) -> usize {
        let mut filled = 0;
        for (response, error) in self.responses.iter().zip(self.errors.iter_mut()) {
            if response.is_none() && error.is_none() {
                *error = Some(RequestError::Ignored);
                filled += 1;
            }
        }
        filled
    }

    /// Both output arrays at once
    pub(crate) fn outputs(&mut self) -> (&mut [Option<Response>], &[Option<RequestError>]) {
        (self.responses.as_mut_slice(), self.errors.as_slice())
    }
}

/// Requests waiting to be published onto the dispatch queue
pub(crate) struct Publication {
    requests: Vec<Request>,
}

impl Publication {
    /// Send every request with its index, in index order, each one only once a dispatch
    /// worker is ready for it. Stops early when `stop` is raised or the queue has no
    /// receiver. Returns the number of requests published.
    pub(crate) fn publish(
        self,
        queue: &Sender<IndexedRequest>,
        gate: &DispatchGate,
        stop: &StopSignal,
    ) -> usize {
        let mut published = 0;
        for (index, request) in self.requests.into_iter().enumerate() {
            if !gate.acquire(stop) {
                break;
            }
            if queue.send(IndexedRequest { index, request }).is_err() {
                break;
            }
            published += 1;
        }
        published
    }
}
