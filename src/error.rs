//! Error taxonomy.
//!
//! Two levels:
//!
//! - [`BulkError`] stops a run (or a batch construction) before any result is produced
//! - [`RequestError`] describes why one index of a batch has no usable response; it is data
//!   in the batch's error array, never a reason to abort other requests

use crate::transport::TransportError;
use std::fmt;
use std::io;

/// Pipeline stage, used to label pool-level failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Publish,
    Dispatch,
    Process,
    Collect,
    Orchestrate,
}

impl Stage {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Publish => "publish",
            Stage::Dispatch => "dispatch",
            Stage::Process => "process",
            Stage::Collect => "collect",
            Stage::Orchestrate => "orchestrate",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run-level failure
#[derive(Debug)]
pub enum BulkError {
    /// The batch holds no requests; no work was attempted
    RequestsNotFound,
    /// A worker pool was configured with zero workers
    InvalidPoolSize {
        stage: Stage,
        size: usize,
    },
    /// A pipeline coroutine could not be spawned
    Spawn {
        stage: Stage,
        source: io::Error,
    },
    /// The collector terminated without delivering its outcomes
    CollectorLost,
}

impl fmt::Display for BulkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BulkError::RequestsNotFound => write!(f, "no requests provided"),
            BulkError::InvalidPoolSize { stage, size } => {
                write!(f, "invalid {} pool size {}: at least one worker is required", stage, size)
            }
            BulkError::Spawn { stage, source } => {
                write!(f, "failed to spawn {} coroutine: {}", stage, source)
            }
            BulkError::CollectorLost => write!(f, "collector terminated before delivering results"),
        }
    }
}

impl std::error::Error for BulkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BulkError::Spawn { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Why one request has no usable response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The transport failed (network, timeout, malformed request)
    Transport(TransportError),
    /// A response arrived but its body could not be read
    BodyRead(String),
    /// The transport produced neither a response nor an error
    Protocol(String),
    /// The run ended before this request's outcome was finalized
    Ignored,
}

impl RequestError {
    /// `false` for [`RequestError::Ignored`], which is not a failure of the request itself
    #[must_use]
    pub fn is_failure(&self) -> bool {
        !self.is_ignored()
    }

    #[must_use]
    pub fn is_ignored(&self) -> bool {
        matches!(self, RequestError::Ignored)
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::Transport(err) => write!(f, "http client error: {}", err),
            RequestError::BodyRead(cause) => {
                write!(f, "error while reading response body: {}", cause)
            }
            RequestError::Protocol(message) => f.write_str(message),
            RequestError::Ignored => write!(f, "request ignored"),
        }
    }
}

impl std::error::Error for RequestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RequestError::Transport(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TransportError> for RequestError {
    fn from(err: TransportError) -> Self {
        RequestError::Transport(err)
    }
}
