//! Per-request cancellable execution scope.
//!
//! Every request scope is a child of the adapter's root token, so a forced
//! shutdown cancels all in-flight handlers without per-handler plumbing.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::RouterError;

/// Cancellation token plus optional deadline carried by a request.
#[derive(Debug, Clone)]
pub struct RequestScope {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestScope {
    /// A scope that is never cancelled unless [`cancel`](Self::cancel) is called.
    pub fn detached() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// A scope cancelled whenever `parent` is.
    pub fn child_of(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
            deadline: None,
        }
    }

    /// Derive a child scope that also expires after `timeout`.
    ///
    /// The derived deadline never extends an earlier one.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a child scope that expires at `deadline`.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel this scope and every scope derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once the scope is cancelled or its deadline passes.
    pub async fn done(&self) -> RouterError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.token.cancelled() => RouterError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => RouterError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                RouterError::Cancelled
            }
        }
    }

    /// Run `fut` until it completes or the scope ends, whichever comes first.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, RouterError>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            out = fut => Ok(out),
            err = self.done() => Err(err),
        }
    }
}

impl Default for RequestScope {
    fn default() -> Self {
        Self::detached()
    }
}
