use crate::scope::CancelScope;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use url::Url;

/// Outbound request descriptor.
///
/// Bodies are held as [`Bytes`] so a request can be cloned into the pipeline without copying.
/// The URL is optional: a request without one is still accepted by a batch and is rejected
/// by the transport, which reports it as that index's transport error.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Option<Url>,
    headers: HeaderMap,
    body: Bytes,
    scope: CancelScope,
}

impl Request {
    /// Parse `url` and build a request with an empty body
    pub fn new(method: Method, url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::from_parts(method, Some(Url::parse(url)?)))
    }

    /// Build a GET request
    pub fn get(url: &str) -> Result<Self, url::ParseError> {
        Self::new(Method::GET, url)
    }

    /// Build a POST request carrying `body`
    pub fn post(url: &str, body: impl Into<Bytes>) -> Result<Self, url::ParseError> {
        Ok(Self::new(Method::POST, url)?.with_body(body))
    }

    #[must_use]
    pub fn from_parts(method: Method, url: Option<Url>) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            scope: CancelScope::new(),
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn set_url(&mut self, url: Option<Url>) {
        self.url = url;
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Scope the transport must honor while performing this request
    #[must_use]
    pub fn scope(&self) -> &CancelScope {
        &self.scope
    }

    /// Copy of this request bound to `scope`
    #[must_use]
    pub fn with_scope(&self, scope: CancelScope) -> Self {
        Self {
            scope,
            ..self.clone()
        }
    }

    /// Copy of this request bound to a fresh scope, safe to keep after a run has ended
    #[must_use]
    pub fn detached(&self) -> Self {
        self.with_scope(CancelScope::new())
    }

    /// URL as text, empty when missing
    #[must_use]
    pub fn target(&self) -> String {
        self.url.as_ref().map(Url::to_string).unwrap_or_default()
    }
}
