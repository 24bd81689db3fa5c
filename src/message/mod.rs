//! # Message Module
//!
//! Request and response types that flow through the pipeline.
//!
//! - [`Request`] - method, optional URL, headers, body and the scope it runs under
//! - [`Response`] - status, status line, headers and a [`Body`]
//! - [`Body`] - either a transport stream or a buffered, replayable byte buffer
//!
//! Responses handed back by [`crate::Client::run`] always carry buffered bodies, so they
//! stay readable after the run's scope has ended.

mod body;
mod request;
mod response;

pub use body::Body;
pub use request::Request;
pub use response::Response;
