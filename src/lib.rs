//! # bulkhttp
//!
//! **bulkhttp** executes an ordered batch of outbound HTTP requests with bounded concurrency
//! and hands back the results in the caller's order, correlated by index rather than by
//! completion time.
//!
//! ## Overview
//!
//! A run pushes every request through two independently sized coroutine pools:
//!
//! - a **dispatch** pool that calls the [`Transport`] once per request
//! - a **processing** pool that classifies each raw outcome and, on success, reads the body
//!   into memory so the response stays readable after the run
//!
//! A single collector gathers the classified outcomes and the client writes them into the
//! batch's two parallel output arrays. For every index exactly one of
//! `responses[i]` / `errors[i]` is populated when [`Client::run`] returns.
//!
//! ## Architecture
//!
//! - **[`batch`]** - ordered requests and the output arrays
//! - **[`client`]** - one run at a time: wiring, waiting, writing results
//! - **[`pipeline`]** - dispatch, processing, collector and staged shutdown
//! - **[`transport`]** - the transport seam and the `reqwest` based [`HttpTransport`]
//! - **[`scope`]** - caller-owned cancellation and deadline
//! - **[`message`]** - request, response and body types
//! - **[`worker_pool`]** - coroutine pools and [`PipelineMetrics`]
//! - **[`runtime_config`]** / **[`logging`]** - environment-driven configuration
//!
//! ### Run Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Caller
//!     participant Client
//!     participant Publisher
//!     participant Dispatch as Dispatch pool (Wd)
//!     participant Transport
//!     participant Process as Process pool (Wp)
//!     participant Collector
//!     participant Orchestrator
//!
//!     Caller->>Client: run(&mut batch)
//!     Client->>Client: bind scope, reset output arrays
//!     Client->>Process: spawn Wp workers
//!     Client->>Dispatch: spawn Wd workers
//!     Client->>Collector: spawn
//!     Client->>Publisher: spawn
//!     Client->>Orchestrator: spawn
//!
//!     loop every request, in index order
//!         Publisher->>Dispatch: IndexedRequest
//!         Dispatch->>Transport: perform(&request)
//!         Transport-->>Dispatch: Result<Response, TransportError>
//!         Dispatch->>Process: RawOutcome
//!         Process->>Process: classify, buffer body, close original
//!         Process->>Collector: FinalizedOutcome
//!     end
//!
//!     Collector-->>Client: outcomes (all N, or fewer if the scope ended)
//!     Client->>Client: raise stop, write by index, fill unresolved as Ignored
//!     Orchestrator->>Orchestrator: join publisher, close dispatch queue
//!     Orchestrator->>Orchestrator: join dispatch pool, close raw queue
//!     Orchestrator->>Orchestrator: join process pool, close finalized queue
//!     Client->>Orchestrator: join
//!     Client-->>Caller: (responses, errors)
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use bulkhttp::{Batch, CancelScope, Client, HttpTransport, Request};
//! use std::time::Duration;
//!
//! let transport = HttpTransport::with_timeout(Duration::from_millis(500)).unwrap();
//! let client = Client::new(transport, CancelScope::new());
//!
//! let requests = (0..10)
//!     .map(|_| Request::get("http://127.0.0.1:8080/?kind=fast").unwrap())
//!     .collect();
//! let mut batch = Batch::new(requests, 4, 4).unwrap();
//!
//! let (responses, errors) = client.run(&mut batch).unwrap();
//! assert_eq!(responses.len(), errors.len());
//! batch.close();
//! ```
//!
//! ## Failure Semantics
//!
//! - A failing request never aborts the others; its reason lands in `errors[i]`
//! - [`RequestError::Ignored`] marks requests the run gave up on because the scope ended;
//!   it is not counted as a request failure
//! - Run-level problems (empty batch, spawn failure) surface as [`BulkError`]
//! - There are no retries
//!
//! ## Runtime Considerations
//!
//! Pipeline stages run as `may` coroutines. [`HttpTransport`] drives `reqwest` on its own
//! small tokio runtime and parks the calling coroutine on a `may` channel while waiting, so
//! dispatch workers never block a scheduler thread. Coroutine stack size is configurable via
//! `BULK_STACK_SIZE`.

pub mod batch;
pub mod client;
pub mod error;
pub mod ids;
pub mod logging;
pub mod message;
pub mod pipeline;
pub mod runtime_config;
pub mod scope;
pub mod transport;
pub mod worker_pool;

pub use batch::Batch;
pub use client::Client;
pub use error::{BulkError, RequestError, Stage};
pub use ids::RunId;
pub use message::{Body, Request, Response};
pub use runtime_config::PipelineConfig;
pub use scope::{CancelScope, ScopeError};
pub use transport::{HttpTransport, HttpTransportConfig, Transport, TransportError, TransportErrorKind};
pub use worker_pool::PipelineMetrics;
