//! Processing stage: classify raw outcomes and buffer successful bodies.

use super::{FinalizedOutcome, RawOutcome, StopSignal};
use crate::error::RequestError;
use crate::ids::RunId;
use crate::message::{Request, Response};
use crate::scope::CancelScope;
use crate::transport::TransportError;
use crate::worker_pool::PipelineMetrics;
use may::sync::{mpmc, mpsc};
use std::sync::mpsc::SendError;
use std::sync::Arc;
use tracing::debug;

const NO_RESPONSE: &str = "no response received";

/// Turn a raw transport outcome into the outcome the batch will hold.
///
/// Rules, first match wins:
///
/// 1. a transport error while the run is ending (scope-induced error, or the scope has ended
///    by the time the outcome is classified) is [`RequestError::Ignored`]
/// 2. any other transport error is [`RequestError::Transport`]
/// 3. no response at all is [`RequestError::Protocol`]
/// 4. a body that cannot be read fully is [`RequestError::BodyRead`]
/// 5. otherwise a buffered copy of the response
///
/// The original response body is closed before this returns, whatever the rule.
pub(crate) fn finalize(raw: RawOutcome, scope: &CancelScope) -> FinalizedOutcome {
    let RawOutcome {
        index,
        request,
        mut response,
        error,
    } = raw;

    let result = classify(&request, response.as_mut(), error, scope);
    if let Some(original) = response.as_mut() {
        original.close();
    }

    FinalizedOutcome { index, result }
}

fn classify(
    request: &Request,
    response: Option<&mut Response>,
    error: Option<TransportError>,
    scope: &CancelScope,
) -> Result<Response, RequestError> {
    if let Some(err) = error {
        if err.is_scope_induced() || scope.is_ended() {
            return Err(RequestError::Ignored);
        }
        return Err(RequestError::Transport(err));
    }

    let Some(response) = response else {
        return Err(RequestError::Protocol(NO_RESPONSE.to_string()));
    };

    response
        .buffer(request)
        .map_err(|e| RequestError::BodyRead(e.to_string()))
}

/// Everything one processing worker needs; cloned into every worker of the pool
#[derive(Clone)]
pub(crate) struct ProcessWorker {
    pub run_id: RunId,
    pub scope: CancelScope,
    pub input: mpmc::Receiver<RawOutcome>,
    pub output: mpsc::Sender<FinalizedOutcome>,
    pub stop: StopSignal,
    pub metrics: Arc<PipelineMetrics>,
}

impl ProcessWorker {
    /// Finalize raw outcomes until the input is closed and empty, or the run is stopped
    pub(crate) fn run(&self, worker_id: usize) {
        while let Ok(raw) = self.input.recv() {
            let mut finalized = finalize(raw, &self.scope);
            self.metrics.record_processed();

            if let Err(err) = &finalized.result {
                debug!(
                    run_id = %self.run_id,
                    worker_id = worker_id,
                    index = finalized.index,
                    error = %err,
                    "Request finalized with error"
                );
            }

            if self.stop.is_raised() {
                finalized.release();
                break;
            }
            if let Err(SendError(mut finalized)) = self.output.send(finalized) {
                finalized.release();
                break;
            }
        }
    }
}
