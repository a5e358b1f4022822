// src/gate.rs

//! One-shot broadcast gate.
//!
//! A [`Gate`] is the settle signal of a node: dependents suspend on it until
//! the node finishes (successfully or not), and the cancellation cascade
//! force-releases it so nothing waits on a node that will never run.
//!
//! Contract:
//! - `release` is idempotent; releasing an already-released gate is a no-op.
//! - Any number of concurrent waiters is allowed and all observe release,
//!   including waiters that subscribe after the release happened.
//! - `wait_timeout` is the bounded variant used by the execution routine so
//!   cancellation and stop requests are observed between wait slices.

use std::fmt;
use std::time::Duration;

use tokio::sync::watch;

pub struct Gate {
    released: watch::Sender<bool>,
}

impl Gate {
    pub fn new() -> Self {
        let (released, _) = watch::channel(false);
        Self { released }
    }

    /// Release the gate, waking every current and future waiter.
    pub fn release(&self) {
        self.released.send_replace(true);
    }

    /// Non-blocking query.
    pub fn is_released(&self) -> bool {
        *self.released.borrow()
    }

    /// Suspend until the gate is released.
    ///
    /// Returns immediately if the release already happened.
    pub async fn wait(&self) {
        let mut rx = self.released.subscribe();
        // wait_for inspects the current value before suspending, so a
        // release that predates this call is never missed. The sender lives
        // in `self`, so the channel cannot close while we are borrowed.
        let _ = rx.wait_for(|released| *released).await;
    }

    /// Bounded wait; returns whether the gate was released in time.
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait()).await.is_ok()
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gate")
            .field("released", &self.is_released())
            .finish()
    }
}
