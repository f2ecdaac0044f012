//! Cancellation token for the watchdog task

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Default)]
struct Inner {
    requested: Mutex<bool>,
    wake: Condvar,
}

/// One-shot stop request shared between the owner and its task
///
/// Waits on the token return early once a stop is requested, so the task's
/// sleeps never delay shutdown.
#[derive(Clone, Default)]
pub struct StopToken {
    inner: Arc<Inner>,
}

impl StopToken {
    /// Fresh token with no stop requested
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the task to stop and wake any pending wait
    pub fn request_stop(&self) {
        let mut requested = self
            .inner
            .requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *requested = true;
        self.inner.wake.notify_all();
    }

    /// True once `request_stop` was called
    pub fn is_stop_requested(&self) -> bool {
        *self
            .inner
            .requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for `timeout` unless a stop is requested first
    ///
    /// Returns true if the wait ended because of a stop request.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut requested = self
            .inner
            .requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        while !*requested {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            requested = self
                .inner
                .wake
                .wait_timeout(requested, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

impl std::fmt::Debug for StopToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopToken")
            .field("stop_requested", &self.is_stop_requested())
            .finish()
    }
}
