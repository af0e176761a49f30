//! Units of work that declare their resource needs up front

use crate::allocator::Allocator;
use crate::chord::Chord;
use chords_errors::Error;
use chords_types::{Request, ResourceClass};
use std::future::Future;

/// A piece of work bound to the resources it requires.
///
/// Running it acquires every requirement at once, hands the satisfied
/// chord to the work, and releases on every exit path.
pub struct Task<F> {
    allocator: Allocator,
    requests: Vec<Request>,
    work: F,
}

impl<F> Task<F> {
    pub fn new(allocator: Allocator, work: F) -> Self {
        Self {
            allocator,
            requests: Vec::new(),
            work,
        }
    }

    #[must_use]
    pub fn requires(mut self, request: Request) -> Self {
        self.requests.push(request);
        self
    }

    #[must_use]
    pub fn requires_shared(self, class: impl Into<ResourceClass>) -> Self {
        self.requires(Request::shared(class))
    }

    #[must_use]
    pub fn requires_exclusive(self, class: impl Into<ResourceClass>) -> Self {
        self.requires(Request::exclusive(class))
    }

    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    /// Block until the requirements are met, then run the work
    ///
    /// # Errors
    ///
    /// Returns acquisition errors converted into `E`, or the work's error.
    pub fn run<T, E>(self) -> Result<T, E>
    where
        F: FnOnce(&Chord) -> Result<T, E>,
        E: From<Error>,
    {
        tracing::debug!(requirements = self.requests.len(), "running task");
        self.allocator.chord_of(self.requests).scoped(self.work)
    }

    /// Async form of [`Task::run`]; the work receives a handle to the
    /// satisfied chord
    ///
    /// # Errors
    ///
    /// Returns acquisition errors converted into `E`, or the work's error.
    pub async fn run_async<T, E, Fut>(self) -> Result<T, E>
    where
        F: FnOnce(Chord) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<Error>,
    {
        tracing::debug!(requirements = self.requests.len(), "running async task");
        let chord = self.allocator.chord_of(self.requests);
        let guard = chord.enter_async().await?;
        let outcome = (self.work)(chord.clone()).await;
        let released = guard.release();
        let value = outcome?;
        released?;
        Ok(value)
    }
}

impl<F> std::fmt::Debug for Task<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("requests", &self.requests)
            .finish_non_exhaustive()
    }
}
