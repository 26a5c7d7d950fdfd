// Copyright (c) Microsoft Corporation.

/// Provides the process-wide stop signal.
///
/// This module defines a `Shutdown` struct that any thread can trip (Ctrl-C handler, generator hitting a
/// round limit, a task that faulted) and that the driver blocks on.
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// A one-shot stop signal shared across threads.
///
/// Once stopped it stays stopped. The flag is still usable after a panicking thread poisoned the mutex,
/// since a panic is exactly when the rest of the process needs to hear about it.
pub struct Shutdown {
    /// A condition variable used to wake everybody blocked in `wait_for_stop_signal`.
    cnd: Condvar,
    /// A mutex-protected boolean that indicates whether the run should stop.
    should_stop: Mutex<bool>,
}

impl Shutdown {
    /// Creates a new `Shutdown` with `should_stop` set to `false`.
    pub fn new() -> Self {
        Shutdown {
            cnd: Condvar::new(),
            should_stop: Mutex::new(false),
        }
    }

    fn flag(&self) -> MutexGuard<'_, bool> {
        self.should_stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Signals all waiters to stop.
    ///
    /// This function sets `should_stop` to `true` and notifies all threads waiting on `cnd`. Calling it more
    /// than once is harmless.
    pub fn stop(&self) {
        let mut should_stop = self.flag();
        *should_stop = true;
        self.cnd.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.flag()
    }

    /// Waits for the stop signal condition to be set to true, blocks the thread until then.
    pub fn wait_for_stop_signal(&self) {
        let mut should_stop = self.flag();
        while !*should_stop {
            should_stop = self
                .cnd
                .wait(should_stop)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_stop_releases_waiters() {
        let shutdown = Arc::new(Shutdown::new());
        assert!(!shutdown.is_stopped());

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let shutdown = Arc::clone(&shutdown);
                thread::spawn(move || shutdown.wait_for_stop_signal())
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        shutdown.stop();

        for waiter in waiters {
            waiter.join().unwrap();
        }
        assert!(shutdown.is_stopped());
    }

    #[test]
    fn test_wait_after_stop_returns_immediately() {
        let shutdown = Shutdown::new();
        shutdown.stop();
        shutdown.stop();
        shutdown.wait_for_stop_signal();
        assert!(shutdown.is_stopped());
    }
}
