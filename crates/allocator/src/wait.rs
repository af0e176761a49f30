//! Blocking until a predicate holds
//!
//! A wait strategy calls its predicate repeatedly, parking in between, until
//! the predicate returns `true` or fails. Errors from the predicate are
//! returned unchanged.

use chords_config::WaitConfig;
use chords_errors::{AllocationError, Error, Result};
use chords_resources::ChangeSignal;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Exponential backoff bounds shared by every strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    /// Give up after this long; `None` waits forever
    pub timeout: Option<Duration>,
}

impl Backoff {
    #[must_use]
    pub fn from_config(config: &WaitConfig) -> Self {
        Self {
            initial: config.initial_backoff(),
            max: config.max_backoff(),
            timeout: config.timeout(),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn grow(&self, delay: Duration) -> Duration {
        delay.saturating_mul(2).min(self.max)
    }

    /// Next park duration, clipped to the time left before the deadline
    fn slice(&self, delay: Duration, started: Instant) -> Result<Duration> {
        let Some(timeout) = self.timeout else {
            return Ok(delay);
        };
        let elapsed = started.elapsed();
        if elapsed >= timeout {
            return Err(timed_out(elapsed));
        }
        Ok(delay.min(timeout - elapsed))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&WaitConfig::default())
    }
}

fn timed_out(elapsed: Duration) -> Error {
    AllocationError::WaitTimedOut {
        waited_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
    }
    .into()
}

/// Block until `predicate` returns `true`
pub trait WaitStrategy: Send + Sync + fmt::Debug {
    /// # Errors
    ///
    /// Returns the first error raised by `predicate`, or
    /// `AllocationError::WaitTimedOut` when the strategy gives up.
    fn wait_until(&self, predicate: &mut dyn FnMut() -> Result<bool>) -> Result<()>;
}

/// Parks on a [`ChangeSignal`], re-checking at least once per backoff step
#[derive(Debug, Clone)]
pub struct SignalWait {
    signal: Arc<ChangeSignal>,
    backoff: Backoff,
}

impl SignalWait {
    #[must_use]
    pub fn new(signal: Arc<ChangeSignal>, backoff: Backoff) -> Self {
        Self { signal, backoff }
    }
}

impl WaitStrategy for SignalWait {
    fn wait_until(&self, predicate: &mut dyn FnMut() -> Result<bool>) -> Result<()> {
        let started = Instant::now();
        let mut delay = self.backoff.initial;
        loop {
            // read before evaluating so a change during the predicate is not lost
            let seen = self.signal.generation();
            if predicate()? {
                return Ok(());
            }
            let slice = self.backoff.slice(delay, started)?;
            delay = if self.signal.wait_for_change(seen, slice) {
                self.backoff.initial
            } else {
                self.backoff.grow(delay)
            };
        }
    }
}

/// Sleeps between checks without listening for changes
#[derive(Debug, Clone, Default)]
pub struct PollWait {
    backoff: Backoff,
}

impl PollWait {
    #[must_use]
    pub fn new(backoff: Backoff) -> Self {
        Self { backoff }
    }
}

impl WaitStrategy for PollWait {
    fn wait_until(&self, predicate: &mut dyn FnMut() -> Result<bool>) -> Result<()> {
        let started = Instant::now();
        let mut delay = self.backoff.initial;
        loop {
            if predicate()? {
                return Ok(());
            }
            thread::sleep(self.backoff.slice(delay, started)?);
            delay = self.backoff.grow(delay);
        }
    }
}

/// Async counterpart of [`SignalWait`] for cooperative tasks
///
/// # Errors
///
/// Returns the first error raised by `predicate`, or
/// `AllocationError::WaitTimedOut` once `backoff.timeout` has passed.
pub async fn wait_until_async<F>(
    signal: &ChangeSignal,
    backoff: Backoff,
    mut predicate: F,
) -> Result<()>
where
    F: FnMut() -> Result<bool>,
{
    let started = Instant::now();
    let mut delay = backoff.initial;
    loop {
        let notified = signal.notified();
        tokio::pin!(notified);
        // register interest before checking so a notify in between still wakes us
        notified.as_mut().enable();
        if predicate()? {
            return Ok(());
        }
        let slice = backoff.slice(delay, started)?;
        delay = match tokio::time::timeout(slice, notified).await {
            Ok(()) => backoff.initial,
            Err(_) => backoff.grow(delay),
        };
    }
}
