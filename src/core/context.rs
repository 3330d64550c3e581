//! Cancellation and deadline carrier threaded through every blocking call.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, FutureExt};
use tokio::sync::watch;
use tokio::time::Instant;

use super::ExecutionError;

/// Request scope for store operations.
///
/// A context carries every cancellation scope it was derived from plus the
/// earliest deadline among them. Cloning is cheap; children never outlive a
/// cancelled parent.
#[derive(Clone, Debug, Default)]
pub struct Context {
    scopes: Vec<Arc<watch::Sender<bool>>>,
    deadline: Option<Instant>,
}

/// Cancels the context it was created with, and every context derived from it.
///
/// Dropping the handle does not cancel.
#[derive(Debug)]
pub struct CancelHandle {
    scope: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.scope.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.scope.borrow()
    }
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derives a child that can be cancelled independently of `self`.
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let (tx, _) = watch::channel(false);
        let scope = Arc::new(tx);
        let mut child = self.clone();
        child.scopes.push(Arc::clone(&scope));
        (child, CancelHandle { scope })
    }

    /// Derives a child whose deadline is at most `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut child = self.clone();
        child.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        child
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.scopes.iter().any(|scope| *scope.borrow())
    }

    /// Why the context is done, if it is.
    pub fn err(&self) -> Option<ExecutionError> {
        if self.is_cancelled() {
            return Some(ExecutionError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ExecutionError::TimedOut),
            _ => None,
        }
    }

    pub fn check(&self) -> Result<(), ExecutionError> {
        match self.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Resolves once any scope of this context is cancelled. Never resolves
    /// for a context without cancellation scopes.
    pub async fn cancelled(&self) {
        if self.scopes.is_empty() {
            return future::pending().await;
        }

        let waits = self.scopes.iter().map(|scope| {
            let mut rx = scope.subscribe();
            async move {
                loop {
                    let cancelled = *rx.borrow_and_update();
                    if cancelled {
                        return;
                    }
                    // The sender lives in `self.scopes`, so this never errors
                    // while we are waiting.
                    if rx.changed().await.is_err() {
                        return future::pending().await;
                    }
                }
            }
            .boxed()
        });
        future::select_all(waits).await;
    }

    /// Drives `operation` until it completes, the context is cancelled, or
    /// the deadline passes. The operation is dropped on cancellation.
    pub async fn run<F>(&self, operation: F) -> Result<F::Output, ExecutionError>
    where
        F: Future,
    {
        self.check()?;

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancelled() => Err(ExecutionError::Cancelled),
            _ = deadline => Err(ExecutionError::TimedOut),
            output = operation => Ok(output),
        }
    }
}
