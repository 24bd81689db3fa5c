//! Dispatch stage: hand each request to the transport, exactly once.

use super::{panic_message, DispatchGate, IndexedRequest, RawOutcome, StopSignal};
use crate::ids::RunId;
use crate::transport::Transport;
use crate::worker_pool::PipelineMetrics;
use may::sync::mpmc::{Receiver, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::SendError;
use std::sync::Arc;
use tracing::{debug, error};

/// Everything one dispatch worker needs; cloned into every worker of the pool
pub(crate) struct DispatchWorker<T: ?Sized> {
    pub run_id: RunId,
    pub transport: Arc<T>,
    pub input: Receiver<IndexedRequest>,
    pub gate: DispatchGate,
    pub output: Sender<RawOutcome>,
    pub stop: StopSignal,
    pub metrics: Arc<PipelineMetrics>,
}

impl<T: ?Sized> Clone for DispatchWorker<T> {
    fn clone(&self) -> Self {
        Self {
            run_id: self.run_id,
            transport: self.transport.clone(),
            input: self.input.clone(),
            gate: self.gate.clone(),
            output: self.output.clone(),
            stop: self.stop.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<T: Transport + ?Sized> DispatchWorker<T> {
    /// Pull requests until the queue is closed and empty, or the run is stopped
    pub(crate) fn run(&self, worker_id: usize) {
        loop {
            self.gate.ready();
            let Ok(IndexedRequest { index, request }) = self.input.recv() else {
                break;
            };
            if self.stop.is_raised() {
                break;
            }

            self.metrics.record_dispatch();
            let performed = catch_unwind(AssertUnwindSafe(|| self.transport.perform(&request)));
            let (response, error) = match performed {
                Ok(Ok(response)) => (Some(response), None),
                Ok(Err(err)) => {
                    debug!(
                        run_id = %self.run_id,
                        worker_id = worker_id,
                        index = index,
                        error = %err,
                        "Transport returned an error"
                    );
                    (None, Some(err))
                }
                Err(panic) => {
                    error!(
                        run_id = %self.run_id,
                        worker_id = worker_id,
                        index = index,
                        panic_message = %panic_message(panic.as_ref()),
                        "Transport panicked"
                    );
                    (None, None)
                }
            };

            let mut outcome = RawOutcome {
                index,
                request,
                response,
                error,
            };

            if self.stop.is_raised() {
                outcome.release();
                break;
            }
            if let Err(SendError(mut outcome)) = self.output.send(outcome) {
                outcome.release();
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Body, Request, Response};
    use crate::transport::{TransportError, TransportErrorKind};
    use http::{HeaderMap, StatusCode};
    use may::sync::mpmc;
    use std::io::{self, Read};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct DropCounter(Arc<AtomicUsize>);

    impl Read for DropCounter {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Ok(0)
        }
    }

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counted_response(drops: &Arc<AtomicUsize>) -> Response {
        Response::new(
            StatusCode::OK,
            HeaderMap::new(),
            Body::new(DropCounter(drops.clone())),
        )
    }

    fn ok_transport(_: &Request) -> Result<Response, TransportError> {
        Ok(Response::new(StatusCode::OK, HeaderMap::new(), Body::from_bytes("ok")))
    }

    fn worker<T: Transport + ?Sized>(
        transport: Arc<T>,
    ) -> (
        DispatchWorker<T>,
        Sender<IndexedRequest>,
        Receiver<RawOutcome>,
    ) {
        let (request_tx, request_rx) = mpmc::channel();
        let (raw_tx, raw_rx) = mpmc::channel();
        let worker = DispatchWorker {
            run_id: RunId::new(),
            transport,
            input: request_rx,
            gate: DispatchGate::default(),
            output: raw_tx,
            stop: StopSignal::default(),
            metrics: Arc::new(PipelineMetrics::new()),
        };
        (worker, request_tx, raw_rx)
    }

    fn indexed(index: usize) -> IndexedRequest {
        IndexedRequest {
            index,
            request: Request::get("http://localhost/").unwrap(),
        }
    }

    #[test]
    fn test_each_request_yields_one_raw_outcome() {
        let (worker, request_tx, raw_rx) = worker(Arc::new(ok_transport));
        for index in 0..3 {
            request_tx.send(indexed(index)).unwrap();
        }
        drop(request_tx);

        worker.run(0);

        let mut indices = Vec::new();
        while let Ok(raw) = raw_rx.try_recv() {
            assert!(raw.response.is_some());
            assert!(raw.error.is_none());
            indices.push(raw.index);
        }
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(worker.metrics.get_dispatched_count(), 3);
    }

    #[test]
    fn test_transport_error_is_forwarded() {
        let failing = |req: &Request| -> Result<Response, TransportError> {
            Err(TransportError::new(TransportErrorKind::Connect, req, "connection refused"))
        };
        let (worker, request_tx, raw_rx) = worker(Arc::new(failing));
        request_tx.send(indexed(7)).unwrap();
        drop(request_tx);

        worker.run(0);

        let raw = raw_rx.try_recv().unwrap();
        assert_eq!(raw.index, 7);
        assert!(raw.response.is_none());
        assert_eq!(raw.error.unwrap().kind(), TransportErrorKind::Connect);
    }

    #[test]
    fn test_panicking_transport_yields_empty_outcome() {
        let panicking = |_: &Request| -> Result<Response, TransportError> {
            panic!("transport bug");
        };
        let (worker, request_tx, raw_rx) = worker(Arc::new(panicking));
        request_tx.send(indexed(0)).unwrap();
        request_tx.send(indexed(1)).unwrap();
        drop(request_tx);

        worker.run(0);

        for expected in 0..2 {
            let raw = raw_rx.try_recv().unwrap();
            assert_eq!(raw.index, expected);
            assert!(raw.response.is_none());
            assert!(raw.error.is_none());
        }
    }

    #[test]
    fn test_stop_prevents_further_dispatch() {
        let (worker, request_tx, raw_rx) = worker(Arc::new(ok_transport));
        request_tx.send(indexed(0)).unwrap();
        drop(request_tx);
        worker.stop.raise();

        worker.run(0);

        assert!(raw_rx.try_recv().is_err());
        assert_eq!(worker.metrics.get_dispatched_count(), 0);
    }

    #[test]
    fn test_stop_during_transport_call_releases_body() {
        let drops = Arc::new(AtomicUsize::new(0));
        let stop = StopSignal::default();
        let transport = {
            let drops = drops.clone();
            let stop = stop.clone();
            move |_: &Request| -> Result<Response, TransportError> {
                stop.raise();
                Ok(counted_response(&drops))
            }
        };
        let (mut worker, request_tx, raw_rx) = worker(Arc::new(transport));
        worker.stop = stop;
        request_tx.send(indexed(0)).unwrap();
        request_tx.send(indexed(1)).unwrap();
        drop(request_tx);

        worker.run(0);

        assert!(raw_rx.try_recv().is_err());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(worker.metrics.get_dispatched_count(), 1);
    }

    #[test]
    fn test_closed_downstream_releases_body() {
        let drops = Arc::new(AtomicUsize::new(0));
        let transport = {
            let drops = drops.clone();
            move |_: &Request| -> Result<Response, TransportError> { Ok(counted_response(&drops)) }
        };
        let (worker, request_tx, raw_rx) = worker(Arc::new(transport));
        drop(raw_rx);
        request_tx.send(indexed(0)).unwrap();
        request_tx.send(indexed(1)).unwrap();
        drop(request_tx);

        worker.run(0);

        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(worker.metrics.get_dispatched_count(), 1);
    }

    #[test]
    fn test_worker_opens_gate_before_each_receive() {
        let (worker, request_tx, _raw_rx) = worker(Arc::new(ok_transport));
        request_tx.send(indexed(0)).unwrap();
        drop(request_tx);
        let stop = StopSignal::default();

        worker.run(0);

        // One permit for the request, one for the receive that saw the queue close.
        assert!(worker.gate.acquire(&stop));
        assert!(worker.gate.acquire(&stop));
        stop.raise();
        assert!(!worker.gate.acquire(&stop));
    }
}
