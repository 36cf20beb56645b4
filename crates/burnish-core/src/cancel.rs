//! Cancellable timed waits
//!
//! Every sleep the engine performs — eject settling, reprobe polling,
//! exclusive-access retries, DMA backoff — goes through a [`CancelToken`]
//! so a cancel request arriving from another thread interrupts the wait
//! immediately instead of after the timeout.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Latchable cancellation flag with interruptible waits
///
/// Once cancelled, every in-flight and future wait returns
/// [`Error::Cancelled`] until [`CancelToken::reset`] is called at the
/// start of the next operation.
pub struct CancelToken {
    cancelled: Mutex<bool>,
    cond: Condvar,
}

impl CancelToken {
    /// Create a token in the not-cancelled state
    pub fn new() -> Self {
        Self {
            cancelled: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    fn guard(&self) -> MutexGuard<'_, bool> {
        self.cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for `duration`, returning early with `Cancelled` if the
    /// token is cancelled before or during the wait
    pub fn sleep(&self, duration: Duration) -> Result<()> {
        let deadline = Instant::now() + duration;
        let mut cancelled = self.guard();

        loop {
            if *cancelled {
                return Err(Error::Cancelled);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }

            let (guard, _timeout) = self
                .cond
                .wait_timeout(cancelled, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            cancelled = guard;
        }
    }

    /// Fail fast if a cancel request is pending
    pub fn checkpoint(&self) -> Result<()> {
        if *self.guard() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Whether a cancel request is pending
    pub fn is_cancelled(&self) -> bool {
        *self.guard()
    }

    /// Cancel: wake every waiter and latch until [`Self::reset`]
    pub fn cancel(&self) {
        *self.guard() = true;
        self.cond.notify_all();
    }

    /// Clear the latch at the start of a new operation
    pub fn reset(&self) {
        *self.guard() = false;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_sleep_completes_when_not_cancelled() {
        let token = CancelToken::new();
        let start = Instant::now();
        token.sleep(Duration::from_millis(20)).expect("not cancelled");
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_pending_cancel_fails_immediately() {
        let token = CancelToken::new();
        token.cancel();

        let start = Instant::now();
        let result = token.sleep(Duration::from_secs(10));
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(1));

        assert!(matches!(token.checkpoint(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_cancel_interrupts_inflight_sleep() {
        let token = Arc::new(CancelToken::new());
        let waiter = Arc::clone(&token);

        let handle = std::thread::spawn(move || waiter.sleep(Duration::from_secs(30)));

        std::thread::sleep(Duration::from_millis(50));
        let start = Instant::now();
        token.cancel();

        let result = handle.join().expect("waiter thread");
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_reset_clears_latch() {
        let token = CancelToken::new();
        token.cancel();
        token.reset();
        assert!(!token.is_cancelled());
        token.sleep(Duration::from_millis(1)).expect("reset token");
    }
}
