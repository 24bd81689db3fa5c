//! # Pipeline Module
//!
//! The stages a run is made of and the values that travel between them.
//!
//! ```text
//! publisher --IndexedRequest--> dispatch pool --RawOutcome--> process pool
//!     --FinalizedOutcome--> collector --> Batch output arrays
//! ```
//!
//! Two signals end a run:
//!
//! - the caller's [`CancelScope`](crate::CancelScope): in-flight transport calls fail fast and
//!   the collector stops waiting
//! - the pipeline's own [`StopSignal`], raised by the client once the collector has delivered,
//!   so workers still holding an outcome release it and exit
//!
//! The orchestrator owns the original sender of every channel and closes them one stage at a
//! time, so a stage only sees its input close after every upstream producer has finished.
//!
//! The publisher hands a request over only when a dispatch worker is waiting for one (see
//! [`DispatchGate`]), so at most one request per dispatch worker sits in the queue.

pub(crate) mod collector;
pub(crate) mod dispatch;
pub(crate) mod orchestrator;
pub(crate) mod process;

use crate::error::RequestError;
use crate::message::{Request, Response};
use crate::transport::TransportError;
use may::sync::Semphore;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How often a blocked publisher re-checks the stop signal
const GATE_POLL: Duration = Duration::from_millis(1);

/// A request together with its position in the batch
#[derive(Debug)]
pub(crate) struct IndexedRequest {
    pub index: usize,
    pub request: Request,
}

/// What the transport produced for one request, before classification.
///
/// Both `response` and `error` are `None` when the transport panicked.
#[derive(Debug)]
pub(crate) struct RawOutcome {
    pub index: usize,
    pub request: Request,
    pub response: Option<Response>,
    pub error: Option<TransportError>,
}

impl RawOutcome {
    /// Drain and close the response body, if any
    pub(crate) fn release(&mut self) {
        if let Some(response) = self.response.as_mut() {
            response.discard();
        }
    }
}

/// Classified result for one index; the only form the collector accepts
#[derive(Debug)]
pub(crate) struct FinalizedOutcome {
    pub index: usize,
    pub result: Result<Response, RequestError>,
}

impl FinalizedOutcome {
    /// Close the buffered body of an outcome that will never be delivered
    pub(crate) fn release(&mut self) {
        if let Ok(response) = self.result.as_mut() {
            response.close();
        }
    }
}

/// Pipeline-local stop broadcast, independent of the caller's scope
#[derive(Debug, Clone, Default)]
pub(crate) struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub(crate) fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Rendezvous between the publisher and the dispatch pool.
///
/// A dispatch worker calls [`ready`](Self::ready) before every receive and the publisher
/// calls [`acquire`](Self::acquire) before every send, so the dispatch queue never holds more
/// requests than there are idle workers.
#[derive(Clone)]
pub(crate) struct DispatchGate(Arc<Semphore>);

impl Default for DispatchGate {
    fn default() -> Self {
        Self(Arc::new(Semphore::new(0)))
    }
}

impl DispatchGate {
    pub(crate) fn ready(&self) {
        self.0.post();
    }

    /// Block until a dispatch worker is ready. Returns `false` once `stop` is raised.
    pub(crate) fn acquire(&self, stop: &StopSignal) -> bool {
        loop {
            if stop.is_raised() {
                return false;
            }
            if self.0.wait_timeout(GATE_POLL) {
                return true;
            }
        }
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
