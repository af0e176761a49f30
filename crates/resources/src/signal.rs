//! Wake-up channel for waiters blocked on resource availability

use parking_lot::{Condvar, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Generation counter bumped whenever resources may have become available.
///
/// Blocking waiters park on the condvar; async waiters use [`Notify`].
#[derive(Debug, Default)]
pub struct ChangeSignal {
    generation: Mutex<u64>,
    condvar: Condvar,
    notify: Notify,
}

impl ChangeSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        *self.generation.lock()
    }

    pub fn notify(&self) {
        {
            let mut generation = self.generation.lock();
            *generation = generation.wrapping_add(1);
        }
        self.condvar.notify_all();
        self.notify.notify_waiters();
    }

    /// Block until the generation moves past `seen` or `timeout` elapses.
    /// Returns whether a change was observed.
    pub fn wait_for_change(&self, seen: u64, timeout: Duration) -> bool {
        let mut generation = self.generation.lock();
        if *generation != seen {
            return true;
        }
        let _ = self
            .condvar
            .wait_while_for(&mut generation, |g| *g == seen, timeout);
        *generation != seen
    }

    /// Future resolving on the next [`ChangeSignal::notify`]
    pub fn notified(&self) -> tokio::sync::futures::Notified<'_> {
        self.notify.notified()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_wait_returns_immediately_when_stale() {
        let signal = ChangeSignal::new();
        let seen = signal.generation();
        signal.notify();
        assert!(signal.wait_for_change(seen, Duration::from_secs(5)));
    }

    #[test]
    fn test_wait_times_out() {
        let signal = ChangeSignal::new();
        assert!(!signal.wait_for_change(signal.generation(), Duration::from_millis(5)));
    }

    #[test]
    fn test_wait_wakes_on_notify() {
        let signal = Arc::new(ChangeSignal::new());
        let seen = signal.generation();
        let notifier = Arc::clone(&signal);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            notifier.notify();
        });
        assert!(signal.wait_for_change(seen, Duration::from_secs(5)));
        handle.join().unwrap();
    }
}
