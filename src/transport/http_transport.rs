//! HTTP transport backed by `reqwest`.
//!
//! `reqwest` is async, the pipeline is coroutine based. Every network step is spawned onto a
//! tokio runtime owned by the transport and its result is sent back over a `may` channel, so
//! the waiting dispatch worker parks as a coroutine instead of pinning a scheduler thread.

use super::{Transport, TransportError, TransportErrorKind};
use crate::message::{Body, Request, Response};
use crate::scope::ScopeError;
use anyhow::{Context, Result};
use bytes::Bytes;
use may::sync::mpsc;
use std::env;
use std::future::Future;
use std::io::{self, Read};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};
use tracing::{debug, info};

const TIMEOUT_MESSAGE: &str =
    "context deadline exceeded (client timeout exceeded while awaiting headers)";

/// Configuration for [`HttpTransport`]
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Whole-request timeout enforced by the client; `None` disables it
    pub timeout: Option<Duration>,
    /// Worker threads of the runtime that drives network I/O
    pub runtime_threads: usize,
}

impl HttpTransportConfig {
    /// Load configuration from environment variables
    ///
    /// - `BULK_HTTP_TIMEOUT_MS`: request timeout in milliseconds, `0` disables (default: 1000)
    /// - `BULK_HTTP_RUNTIME_THREADS`: I/O runtime threads (default: 2)
    pub fn from_env() -> Self {
        let timeout = match env::var("BULK_HTTP_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
            None => Some(Duration::from_secs(1)),
        };

        let runtime_threads = env::var("BULK_HTTP_RUNTIME_THREADS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(2);

        Self {
            timeout,
            runtime_threads,
        }
    }

    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(1)),
            runtime_threads: 2,
        }
    }
}

/// [`Transport`] performing real HTTP calls
pub struct HttpTransport {
    client: reqwest::Client,
    runtime: Arc<Runtime>,
    config: HttpTransportConfig,
}

enum Failure {
    Scope(ScopeError),
    Http(reqwest::Error),
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.runtime_threads.max(1))
            .thread_name("bulkhttp-io")
            .enable_all()
            .build()
            .context("Failed to build transport runtime")?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Failed to build HTTP client")?;

        info!(
            timeout_ms = config.timeout.map(|t| t.as_millis() as u64),
            runtime_threads = config.runtime_threads,
            "HTTP transport ready"
        );

        Ok(Self {
            client,
            runtime: Arc::new(runtime),
            config,
        })
    }

    /// Transport with the given request timeout and default runtime sizing
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Self::new(HttpTransportConfig::with_timeout(timeout))
    }

    #[must_use]
    pub fn config(&self) -> &HttpTransportConfig {
        &self.config
    }
}

impl Transport for HttpTransport {
    fn perform(&self, request: &Request) -> Result<Response, TransportError> {
        if let Some(reason) = request.scope().err() {
            return Err(TransportError::scope(request, reason));
        }
        let Some(url) = request.url() else {
            return Err(TransportError::new(
                TransportErrorKind::InvalidRequest,
                request,
                "nil Request.URL",
            ));
        };

        let pending = self
            .client
            .request(request.method().clone(), url.clone())
            .headers(request.headers().clone())
            .body(request.body().clone());
        let scope = request.scope().clone();
        let handle = self.runtime.handle().clone();

        let outcome = bridge(&handle, async move {
            tokio::select! {
                biased;
                reason = scope.ended() => Err(Failure::Scope(reason)),
                result = pending.send() => result.map_err(Failure::Http),
            }
        })
        .ok_or_else(|| {
            TransportError::new(TransportErrorKind::Other, request, "transport runtime shut down")
        })?;

        match outcome {
            Ok(resp) => {
                let status = resp.status();
                let headers = resp.headers().clone();
                debug!(status = status.as_u16(), url = %url, "Response headers received");
                Ok(Response::new(
                    status,
                    headers,
                    Body::new(StreamingBody::new(resp, handle)),
                )
                .with_request(request.clone()))
            }
            Err(Failure::Scope(reason)) => Err(TransportError::scope(request, reason)),
            Err(Failure::Http(e)) => Err(classify(request, &e)),
        }
    }
}

fn classify(request: &Request, err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::new(TransportErrorKind::Timeout, request, TIMEOUT_MESSAGE);
    }
    let kind = if err.is_connect() {
        TransportErrorKind::Connect
    } else if err.is_builder() || err.is_request() {
        TransportErrorKind::InvalidRequest
    } else {
        TransportErrorKind::Other
    };
    TransportError::new(kind, request, error_chain(err))
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Run `future` on the transport runtime and wait for it from coroutine (or thread) context.
/// `None` when the runtime dropped the task before it completed.
fn bridge<F>(handle: &Handle, future: F) -> Option<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    handle.spawn(async move {
        let _ = tx.send(future.await);
    });
    rx.recv().ok()
}

/// Lazily pulls body chunks from a `reqwest::Response`
struct StreamingBody {
    response: Option<reqwest::Response>,
    pending: Bytes,
    handle: Handle,
}

impl StreamingBody {
    fn new(response: reqwest::Response, handle: Handle) -> Self {
        Self {
            response: Some(response),
            pending: Bytes::new(),
            handle,
        }
    }

    fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        let Some(mut response) = self.response.take() else {
            return Ok(None);
        };
        let (response, chunk) = bridge(&self.handle, async move {
            let chunk = response.chunk().await;
            (response, chunk)
        })
        .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "transport runtime shut down"))?;

        match chunk {
            Ok(Some(bytes)) => {
                self.response = Some(response);
                Ok(Some(bytes))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(io::Error::other(error_chain(&e))),
        }
    }
}

impl Read for StreamingBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pending.is_empty() {
            match self.next_chunk()? {
                Some(chunk) => self.pending = chunk,
                None => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len());
        let chunk = self.pending.split_to(n);
        buf[..n].copy_from_slice(&chunk);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::CancelScope;

    #[test]
    fn test_config_default() {
        let config = HttpTransportConfig::default();
        assert_eq!(config.timeout, Some(Duration::from_secs(1)));
        assert_eq!(config.runtime_threads, 2);
    }

    #[test]
    fn test_missing_url_is_rejected_without_network() {
        let transport = HttpTransport::new(HttpTransportConfig::default()).unwrap();
        let mut req = Request::get("http://127.0.0.1:9/").unwrap();
        req.set_url(None);

        let err = transport.perform(&req).unwrap_err();
        assert_eq!(err.kind(), TransportErrorKind::InvalidRequest);
        assert_eq!(err.to_string(), "Get \"\": nil Request.URL");
    }

    #[test]
    fn test_ended_scope_fails_before_sending() {
        let transport = HttpTransport::new(HttpTransportConfig::default()).unwrap();
        let scope = CancelScope::new();
        scope.cancel();
        let req = Request::get("http://127.0.0.1:9/")
            .unwrap()
            .with_scope(scope);

        let err = transport.perform(&req).unwrap_err();
        assert!(err.is_scope_induced());
        assert_eq!(err.message(), "context canceled");
    }

    #[derive(Debug)]
    struct Wrapped(io::Error);

    impl std::fmt::Display for Wrapped {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "error sending request")
        }
    }

    impl std::error::Error for Wrapped {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_error_chain_joins_sources() {
        let err = Wrapped(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        assert_eq!(
            error_chain(&err),
            "error sending request: connection refused"
        );
    }
}
