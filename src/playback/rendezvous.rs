//! Start/stop rendezvous
//!
//! A condition variable over an `is_stopped` flag plus transition
//! counters, letting `start` and `stop` block until the playback thread
//! acknowledges the transition. The counters matter for short sessions: a
//! source that runs dry within one period can take the device through
//! started and back to stopped before the caller's wait even begins, so
//! the caller snapshots the counter *before* issuing its command and the
//! wait also releases on "a transition happened since that snapshot".
//!
//! Invariant: `is_stopped` is true exactly when the device state is
//! `Stopped`; the playback thread updates both in the same logical
//! transition.

use std::sync::{Condvar, Mutex};

struct Inner {
    is_stopped: bool,
    starts: u64,
    stops: u64,
}

/// Condition-variable-backed stop flag
pub struct Rendezvous {
    inner: Mutex<Inner>,
    condvar: Condvar,
}

impl Rendezvous {
    /// Create a rendezvous in the stopped position.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                is_stopped: true,
                starts: 0,
                stops: 0,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Record whether the device is stopped and wake any waiters.
    ///
    /// Called by the playback thread alongside each device state write.
    pub fn transition(&self, stopped: bool) {
        let mut guard = self.inner.lock().expect("rendezvous mutex poisoned");
        guard.is_stopped = stopped;
        if stopped {
            guard.stops += 1;
        } else {
            guard.starts += 1;
        }
        self.condvar.notify_all();
    }

    /// Snapshot of the start-transition counter, taken before sending the
    /// command whose completion will be awaited.
    pub fn starts(&self) -> u64 {
        self.inner.lock().expect("rendezvous mutex poisoned").starts
    }

    /// Snapshot of the stop-transition counter.
    pub fn stops(&self) -> u64 {
        self.inner.lock().expect("rendezvous mutex poisoned").stops
    }

    /// Block until the playback thread reports the device running, or has
    /// done so since the `observed` snapshot was taken.
    pub fn wait_for_start(&self, observed: u64) {
        let mut guard = self.inner.lock().expect("rendezvous mutex poisoned");
        while guard.is_stopped && guard.starts == observed {
            guard = self
                .condvar
                .wait(guard)
                .expect("rendezvous condvar poisoned");
        }
    }

    /// Block until the playback thread reports the device stopped, or has
    /// done so since the `observed` snapshot was taken.
    pub fn wait_for_stop(&self, observed: u64) {
        let mut guard = self.inner.lock().expect("rendezvous mutex poisoned");
        while !guard.is_stopped && guard.stops == observed {
            guard = self
                .condvar
                .wait(guard)
                .expect("rendezvous condvar poisoned");
        }
    }

    /// Current flag value, for diagnostics.
    pub fn is_stopped(&self) -> bool {
        self.inner
            .lock()
            .expect("rendezvous mutex poisoned")
            .is_stopped
    }
}

impl Default for Rendezvous {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_starts_stopped() {
        let rendezvous = Rendezvous::new();
        assert!(rendezvous.is_stopped());
        // No wait needed when already in position
        rendezvous.wait_for_stop(rendezvous.stops());
    }

    #[test]
    fn test_wait_for_start_unblocks_on_transition() {
        let rendezvous = Arc::new(Rendezvous::new());
        let observed = rendezvous.starts();
        let waiter = Arc::clone(&rendezvous);

        let handle = std::thread::spawn(move || {
            waiter.wait_for_start(observed);
        });

        std::thread::sleep(Duration::from_millis(10));
        rendezvous.transition(false);
        handle.join().unwrap();
        assert!(!rendezvous.is_stopped());
    }

    #[test]
    fn test_wait_for_stop_unblocks_on_transition() {
        let rendezvous = Arc::new(Rendezvous::new());
        rendezvous.transition(false);
        let observed = rendezvous.stops();

        let waiter = Arc::clone(&rendezvous);
        let handle = std::thread::spawn(move || {
            waiter.wait_for_stop(observed);
        });

        std::thread::sleep(Duration::from_millis(10));
        rendezvous.transition(true);
        handle.join().unwrap();
        assert!(rendezvous.is_stopped());
    }

    #[test]
    fn test_wait_for_start_releases_after_fast_session() {
        let rendezvous = Arc::new(Rendezvous::new());
        let observed = rendezvous.starts();
        let waiter = Arc::clone(&rendezvous);

        let handle = std::thread::spawn(move || {
            waiter.wait_for_start(observed);
        });

        std::thread::sleep(Duration::from_millis(10));
        // Started and stopped again before the waiter can observe it
        rendezvous.transition(false);
        rendezvous.transition(true);
        handle.join().unwrap();
        assert!(rendezvous.is_stopped());
    }

    #[test]
    fn test_wait_for_start_sees_transition_before_wait_begins() {
        let rendezvous = Rendezvous::new();
        let observed = rendezvous.starts();

        // The whole session happens before the waiter even gets there
        rendezvous.transition(false);
        rendezvous.transition(true);

        // Must return immediately instead of blocking forever
        rendezvous.wait_for_start(observed);
        assert!(rendezvous.is_stopped());
    }
}
