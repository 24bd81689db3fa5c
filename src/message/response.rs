use super::{Body, Request};
use http::{HeaderMap, StatusCode};
use std::io;

/// Response returned by a transport, or re-wrapped by the processing stage.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    status_line: String,
    headers: HeaderMap,
    body: Body,
    request: Option<Request>,
}

impl Response {
    /// Build a response with the canonical status line for `status` (e.g. `"200 OK"`)
    #[must_use]
    pub fn new(status: StatusCode, headers: HeaderMap, body: Body) -> Self {
        Self {
            status,
            status_line: canonical_status_line(status),
            headers,
            body,
            request: None,
        }
    }

    /// Override the status line reported by the peer
    #[must_use]
    pub fn with_status_line(mut self, status_line: impl Into<String>) -> Self {
        self.status_line = status_line.into();
        self
    }

    /// Attach the request that produced this response
    #[must_use]
    pub fn with_request(mut self, request: Request) -> Self {
        self.request = Some(request);
        self
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn status_line(&self) -> &str {
        &self.status_line
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    /// Request that produced this response, when known
    #[must_use]
    pub fn request(&self) -> Option<&Request> {
        self.request.as_ref()
    }

    /// Read the remaining body as UTF-8
    pub fn text(&mut self) -> io::Result<String> {
        self.body.text()
    }

    /// Close the body. Returns `true` when this call closed it.
    pub fn close(&mut self) -> bool {
        self.body.close()
    }

    /// Drain then close the body so the underlying connection can be reused or released
    pub fn discard(&mut self) {
        if let Err(e) = self.body.drain() {
            tracing::debug!(error = %e, status = self.status.as_u16(), "Failed to drain response body");
        }
        self.body.close();
    }

    /// Fully read the body into memory and return an equivalent response whose body is
    /// buffered and whose request no longer depends on the run's scope. The original body is
    /// left consumed but open; the caller decides when to close it.
    pub fn buffer(&mut self, request: &Request) -> io::Result<Response> {
        let bytes = self.body.read_all()?;
        Ok(Response {
            status: self.status,
            status_line: self.status_line.clone(),
            headers: self.headers.clone(),
            body: Body::from_bytes(bytes),
            request: Some(request.detached()),
        })
    }
}

fn canonical_status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}
