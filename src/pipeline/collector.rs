//! Fan-in of finalized outcomes.

use super::FinalizedOutcome;
use crate::scope::CancelScope;
use crate::worker_pool::PipelineMetrics;
use may::sync::mpsc::Receiver;
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

/// Gather finalized outcomes until `expected` have arrived, the input closes, or the scope
/// ends. The collector parks on its input and checks the scope each time `poll` passes
/// without an outcome. Outcomes already queued are always taken before the scope is
/// checked, so a run that completes just as its scope ends still reports every result it
/// produced.
pub(crate) fn collect(
    expected: usize,
    input: &Receiver<FinalizedOutcome>,
    scope: &CancelScope,
    poll: Duration,
    metrics: &PipelineMetrics,
) -> Vec<FinalizedOutcome> {
    let mut outcomes = Vec::with_capacity(expected);

    while outcomes.len() < expected {
        match input.recv_timeout(poll) {
            Ok(outcome) => outcomes.push(outcome),
            Err(RecvTimeoutError::Timeout) => {
                if scope.is_ended() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    metrics.record_collected(outcomes.len());
    outcomes
}
