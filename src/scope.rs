//! # Cancellable Scope
//!
//! A [`CancelScope`] is the caller-owned cancellation and deadline signal shared by every
//! stage of a run. It can outlive a single run: a client built with one scope will treat
//! every subsequent run as aborting once that scope has ended.
//!
//! ## Semantics
//!
//! - [`CancelScope::cancel`] ends the scope immediately with [`ScopeError::Cancelled`]
//! - A deadline ends the scope lazily with [`ScopeError::DeadlineExceeded`] once it passes
//! - Child scopes end when their parent ends, and may carry a tighter deadline
//!
//! Synchronous code samples the scope with [`CancelScope::err`]; asynchronous transport
//! code awaits [`CancelScope::ended`].
//!
//! ```rust
//! use bulkhttp::scope::{CancelScope, ScopeError};
//!
//! let scope = CancelScope::new();
//! let child = scope.child();
//! scope.cancel();
//! assert_eq!(child.err(), Some(ScopeError::Cancelled));
//! ```

use std::fmt;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Reason a scope has ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeError {
    /// The scope (or one of its ancestors) was cancelled explicitly
    Cancelled,
    /// The scope's deadline passed
    DeadlineExceeded,
}

impl fmt::Display for ScopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeError::Cancelled => write!(f, "context canceled"),
            ScopeError::DeadlineExceeded => write!(f, "context deadline exceeded"),
        }
    }
}

impl std::error::Error for ScopeError {}

/// Shared cancellation signal with an optional deadline.
///
/// Cloning is cheap and every clone observes the same state.
#[derive(Debug, Clone)]
pub struct CancelScope {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for CancelScope {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelScope {
    /// Create a scope with no deadline that only ends when cancelled
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Create a scope that ends `timeout` from now
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Create a scope that ends at `deadline`
    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Derive a scope that ends with this one but can be cancelled on its own
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derive a child scope whose deadline is the earlier of the parent's and `timeout` from now
    #[must_use]
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let own = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) if parent < own => parent,
            _ => own,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// End this scope and every child derived from it
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Deadline of this scope, if any
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when the scope has no deadline
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Why the scope has ended, or `None` while it is still live
    ///
    /// Cancellation takes precedence over an expired deadline.
    #[must_use]
    pub fn err(&self) -> Option<ScopeError> {
        if self.token.is_cancelled() {
            return Some(ScopeError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ScopeError::DeadlineExceeded),
            _ => None,
        }
    }

    /// `true` once the scope is cancelled or past its deadline
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.err().is_some()
    }

    /// Resolve when the scope ends. Requires a tokio runtime with the time driver enabled
    /// when the scope carries a deadline.
    pub async fn ended(&self) -> ScopeError {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => ScopeError::Cancelled,
                    _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {
                        ScopeError::DeadlineExceeded
                    }
                }
            }
            None => {
                self.token.cancelled().await;
                ScopeError::Cancelled
            }
        }
    }
}
