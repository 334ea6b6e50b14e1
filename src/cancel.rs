//! Request-scoped cancellation.
//!
//! A [`CancelToken`] observes an abort signal broadcast by its
//! [`CancelHandle`] and, optionally, its own deadline. A child token created
//! with [`CancelToken::child_with_timeout`] fires when either the parent
//! signal fires or the child's deadline passes, whichever comes first.
//! Tokens are passed by value; there is no ambient cancellation state.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

/// Why a token fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The token's own deadline passed.
    TimedOut,
    /// The parent signal was broadcast.
    Aborted,
}

/// Sending side of a cancellation signal.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Broadcast the abort signal. Does not wait for anyone to observe it.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Receiving side of a cancellation signal, with an optional deadline.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// Create a linked handle/token pair.
    pub fn new() -> (CancelHandle, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelToken { rx, deadline: None })
    }

    /// A token that never fires on its own.
    pub fn never() -> CancelToken {
        let (_tx, rx) = watch::channel(false);
        CancelToken { rx, deadline: None }
    }

    /// Derive a token that also fires `timeout` from now.
    ///
    /// The child keeps the earlier of its own and its parent's deadline.
    pub fn child_with_timeout(&self, timeout: Duration) -> CancelToken {
        let own = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) if parent < own => parent,
            _ => own,
        };
        CancelToken {
            rx: self.rx.clone(),
            deadline: Some(deadline),
        }
    }

    /// Whether the token has already fired.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolve once the token fires.
    pub async fn cancelled(&self) -> CancelReason {
        let mut rx = self.rx.clone();
        let signal = async move {
            loop {
                if *rx.borrow_and_update() {
                    return;
                }
                if rx.changed().await.is_err() {
                    // Handle dropped without cancelling: never fires.
                    std::future::pending::<()>().await;
                }
            }
        };

        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = signal => CancelReason::Aborted,
                    _ = sleep_until(deadline) => CancelReason::TimedOut,
                }
            }
            None => {
                signal.await;
                CancelReason::Aborted
            }
        }
    }

    /// Run `fut` until it completes or the token fires. A token that has
    /// already fired never polls `fut`.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, CancelReason>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            reason = self.cancelled() => Err(reason),
            out = fut => Ok(out),
        }
    }
}
