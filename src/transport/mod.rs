//! # Transport Module
//!
//! The transport is the single capability the pipeline needs from its environment:
//! perform one request and hand back either a response or a failure.
//!
//! ## Contract
//!
//! - [`Transport::perform`] is synchronous from the caller's point of view and must be safe
//!   to call concurrently from every dispatch worker
//! - It should honor [`Request::scope`](crate::Request::scope): once the scope ends, in-flight
//!   calls fail fast with a [`TransportErrorKind::Scope`] error
//! - It never retries; a failure is terminal for that request
//!
//! Closures with the right signature are transports, which keeps test doubles short:
//!
//! ```rust
//! use bulkhttp::{Body, Request, Response, TransportError};
//! use http::{HeaderMap, StatusCode};
//!
//! let echo = |req: &Request| -> Result<Response, TransportError> {
//!     Ok(Response::new(StatusCode::OK, HeaderMap::new(), Body::from_bytes(req.body().clone())))
//! };
//! # let _ = echo;
//! ```
//!
//! [`HttpTransport`] is the production implementation built on `reqwest`.

mod http_transport;

pub use http_transport::{HttpTransport, HttpTransportConfig};

use crate::message::{Request, Response};
use crate::scope::ScopeError;
use std::fmt;

/// Capability that performs exactly one network call per request
pub trait Transport: Send + Sync {
    fn perform(&self, request: &Request) -> Result<Response, TransportError>;
}

impl<F> Transport for F
where
    F: Fn(&Request) -> Result<Response, TransportError> + Send + Sync,
{
    fn perform(&self, request: &Request) -> Result<Response, TransportError> {
        self(request)
    }
}

/// Broad category of a transport failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The request's scope ended before or during the call
    Scope(ScopeError),
    /// The transport's own timeout elapsed
    Timeout,
    /// No connection could be established
    Connect,
    /// The request could not be sent as described (e.g. missing URL)
    InvalidRequest,
    Other,
}

/// Failure reported by a transport.
///
/// Displays as `<Method> "<url>": <message>`, e.g.
/// `Get "http://127.0.0.1:8080/?kind=slow": context deadline exceeded`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    kind: TransportErrorKind,
    operation: String,
    message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, request: &Request, message: impl Into<String>) -> Self {
        Self {
            kind,
            operation: format!("{} \"{}\"", method_label(request.method()), request.target()),
            message: message.into(),
        }
    }

    /// Failure caused by the request's scope ending
    #[must_use]
    pub fn scope(request: &Request, reason: ScopeError) -> Self {
        Self::new(TransportErrorKind::Scope(reason), request, reason.to_string())
    }

    #[must_use]
    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// `true` when the failure was caused by cancellation or deadline rather than the network
    #[must_use]
    pub fn is_scope_induced(&self) -> bool {
        matches!(self.kind, TransportErrorKind::Scope(_))
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.operation, self.message)
    }
}

impl std::error::Error for TransportError {}

/// `GET` -> `Get`, `POST` -> `Post`
fn method_label(method: &http::Method) -> String {
    let mut chars = method.as_str().chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Body;
    use http::{HeaderMap, Method, StatusCode};

    #[test]
    fn test_method_label() {
        assert_eq!(method_label(&Method::GET), "Get");
        assert_eq!(method_label(&Method::DELETE), "Delete");
        assert_eq!(
            method_label(&Method::from_bytes(b"PURGE").unwrap()),
            "Purge"
        );
    }

    #[test]
    fn test_error_display_with_url() {
        let req = Request::get("http://127.0.0.1:8080/?kind=slow").unwrap();
        let err = TransportError::new(
            TransportErrorKind::Timeout,
            &req,
            "context deadline exceeded",
        );
        assert_eq!(
            err.to_string(),
            "Get \"http://127.0.0.1:8080/?kind=slow\": context deadline exceeded"
        );
        assert!(!err.is_scope_induced());
    }

    #[test]
    fn test_error_display_without_url() {
        let mut req = Request::get("http://127.0.0.1:8080/").unwrap();
        req.set_url(None);
        let err = TransportError::new(TransportErrorKind::InvalidRequest, &req, "nil Request.URL");
        assert_eq!(err.to_string(), "Get \"\": nil Request.URL");
    }

    #[test]
    fn test_scope_error_is_scope_induced() {
        let req = Request::get("http://127.0.0.1:8080/").unwrap();
        let err = TransportError::scope(&req, ScopeError::Cancelled);
        assert!(err.is_scope_induced());
        assert_eq!(err.message(), "context canceled");
        assert_eq!(err.kind(), TransportErrorKind::Scope(ScopeError::Cancelled));
    }

    #[test]
    fn test_closure_is_a_transport() {
        let transport = |_: &Request| -> Result<Response, TransportError> {
            Ok(Response::new(
                StatusCode::NO_CONTENT,
                HeaderMap::new(),
                Body::empty(),
            ))
        };
        let req = Request::get("http://127.0.0.1:8080/").unwrap();
        let resp = transport.perform(&req).unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }
}
