//! Deadlines and cancellation.
//!
//! A [`LookupContext`] is handed to every lookup. It carries an optional
//! absolute deadline and a cancellation token. All operations that may
//! suspend, i.e., dialing a server, the TLS handshake, and exchanging
//! messages, are run through the context so they abort as soon as either
//! the deadline passes or the token is cancelled.

use std::future::{self, Future};
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

//------------ LookupContext -------------------------------------------------

/// The deadline and cancellation state of a lookup.
///
/// The default context has no deadline and is never cancelled unless its
/// token is. Contexts are cheap to clone; clones share the token.
#[derive(Clone, Debug, Default)]
pub struct LookupContext {
    /// The point in time after which the lookup is abandoned.
    deadline: Option<Instant>,

    /// Cancels the lookup when triggered.
    cancel: CancellationToken,
}

impl LookupContext {
    /// Creates a context without deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a context that ends at the given deadline.
    ///
    /// If the context already has an earlier deadline, that one is kept.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    /// Returns a context that ends after `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Returns a context that is cancelled through the given token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Returns the deadline of the context, if there is one.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the cancellation token of the context.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns whether the context has been cancelled or has expired.
    pub fn is_done(&self) -> bool {
        self.check(self.deadline).is_err()
    }

    /// Returns the tighter of the context deadline and `timeout` from now.
    ///
    /// A zero `timeout` does not impose a bound.
    pub(crate) fn effective_deadline(
        &self,
        timeout: Duration,
    ) -> Option<Instant> {
        if timeout.is_zero() {
            return self.deadline;
        }
        let bound = Instant::now() + timeout;
        Some(match self.deadline {
            Some(deadline) => deadline.min(bound),
            None => bound,
        })
    }

    /// Runs `fut` until it completes, `deadline` passes, or the context is
    /// cancelled.
    ///
    /// The state is checked before `fut` is polled for the first time, so
    /// an expired context never starts any work.
    pub(crate) async fn run<F: Future>(
        &self,
        deadline: Option<Instant>,
        fut: F,
    ) -> Result<F::Output, Interrupted> {
        self.check(deadline)?;
        let expired = async {
            match deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => future::pending().await,
            }
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupted::Cancelled),
            _ = expired => Err(Interrupted::DeadlineExceeded),
            res = fut => Ok(res),
        }
    }

    fn check(&self, deadline: Option<Instant>) -> Result<(), Interrupted> {
        if self.cancel.is_cancelled() {
            return Err(Interrupted::Cancelled);
        }
        match deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Err(Interrupted::DeadlineExceeded)
            }
            _ => Ok(()),
        }
    }
}

//------------ Interrupted ---------------------------------------------------

/// The reason an operation run through a context was cut short.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Interrupted {
    /// The cancellation token was triggered.
    Cancelled,

    /// The deadline passed.
    DeadlineExceeded,
}

//============ Testing =======================================================
