//! The all-or-nothing resource set of one unit of work

use crate::allocator::Allocator;
use crate::fairness::FairnessPolicy;
use crate::wait;
use chords_errors::{AllocationError, Error, Result};
use chords_events::{AllocationEvent, EventEmitter, FailureContext};
use chords_resources::Resource;
use chords_types::{Attributes, Request, ResourceClass};
use parking_lot::Mutex;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_CHORD_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique chord identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChordId(u64);

impl ChordId {
    fn next() -> Self {
        Self(NEXT_CHORD_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chord-{}", self.0)
    }
}

type Allocation = Vec<(Request, Arc<dyn Resource>)>;

#[derive(Debug, Default)]
struct ChordState {
    requests: Vec<Request>,
    allocation: Option<Allocation>,
    /// Failure captured by a retry pass, handed to the waiting caller
    error: Option<Error>,
    /// Queued on the fairness policy and still wanted by its caller
    pending: bool,
}

#[derive(Debug)]
pub(crate) struct ChordInner {
    id: ChordId,
    allocator: Allocator,
    state: Mutex<ChordState>,
}

/// Requests of one unit of work, acquired and released together.
///
/// A chord is either unsatisfied and holds nothing, or satisfied and holds
/// exactly one resource per request. Cloning yields another handle to the
/// same chord.
#[derive(Debug, Clone)]
pub struct Chord {
    inner: Arc<ChordInner>,
}

/// Non-owning handle kept by fairness queues
#[derive(Debug, Clone)]
pub(crate) struct WeakChord(Weak<ChordInner>);

impl WeakChord {
    pub(crate) fn upgrade(&self) -> Option<Chord> {
        self.0.upgrade().map(|inner| Chord { inner })
    }
}

impl Chord {
    pub(crate) fn new(allocator: Allocator, requests: Vec<Request>) -> Self {
        Self {
            inner: Arc::new(ChordInner {
                id: ChordId::next(),
                allocator,
                state: Mutex::new(ChordState {
                    requests,
                    ..ChordState::default()
                }),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> ChordId {
        self.inner.id
    }

    #[must_use]
    pub fn allocator(&self) -> &Allocator {
        &self.inner.allocator
    }

    pub(crate) fn downgrade(&self) -> WeakChord {
        WeakChord(Arc::downgrade(&self.inner))
    }

    /// Append a request
    ///
    /// # Errors
    ///
    /// Returns `AllocationError::AlreadySatisfied` while resources are held.
    pub fn add_request(&self, request: Request) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.allocation.is_some() {
            return Err(AllocationError::AlreadySatisfied.into());
        }
        state.requests.push(request);
        Ok(())
    }

    /// Builder form of [`Chord::add_request`]
    ///
    /// # Errors
    ///
    /// Returns `AllocationError::AlreadySatisfied` while resources are held.
    pub fn with(self, request: Request) -> Result<Self> {
        self.add_request(request)?;
        Ok(self)
    }

    #[must_use]
    pub fn requests(&self) -> Vec<Request> {
        self.inner.state.lock().requests.clone()
    }

    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        self.inner.state.lock().allocation.is_some()
    }

    /// Held resources paired with the request each was acquired for,
    /// in request order
    #[must_use]
    pub fn allocation(&self) -> Option<Vec<(Request, Arc<dyn Resource>)>> {
        self.inner.state.lock().allocation.clone()
    }

    /// Whether `resource` is part of the current allocation
    #[must_use]
    pub fn holds(&self, resource: &dyn Resource) -> bool {
        let identity = resource.identity();
        self.inner.state.lock().allocation.as_ref().is_some_and(|allocation| {
            allocation
                .iter()
                .any(|(_, held)| held.class() == resource.class() && held.identity() == identity)
        })
    }

    /// One all-or-nothing allocation attempt.
    ///
    /// Returns `Ok(false)` without side effects when some request has no
    /// free candidate. Already satisfied chords return `Ok(true)`.
    ///
    /// # Errors
    ///
    /// Returns registry errors such as an unknown class.
    pub fn try_allocate(&self) -> Result<bool> {
        self.allocate(false)
    }

    /// Attempt made by a retry pass; chords whose caller has given up are
    /// left alone
    pub(crate) fn try_allocate_pending(&self) -> Result<bool> {
        self.allocate(true)
    }

    fn allocate(&self, only_if_pending: bool) -> Result<bool> {
        let registry = self.inner.allocator.registry();
        let guard = registry.lock_allocation();
        let mut state = self.inner.state.lock();
        if state.allocation.is_some() {
            return Ok(true);
        }
        if only_if_pending && !state.pending {
            return Ok(false);
        }

        let mut chosen: Allocation = Vec::with_capacity(state.requests.len());
        for request in &state.requests {
            let candidate = registry.find_resources(request)?.find(|candidate| {
                !chosen.iter().any(|(taken_for, taken)| {
                    taken_for.class() == request.class() && taken.identity() == candidate.identity()
                })
            });
            match candidate {
                Some(resource) => chosen.push((request.clone(), resource)),
                None => {
                    tracing::trace!(chord = %self.id(), request = %request, "no free candidate");
                    return Ok(false);
                }
            }
        }

        for (index, (request, resource)) in chosen.iter().enumerate() {
            if let Err(err) = resource.acquire(request) {
                roll_back(&chosen[..index]);
                tracing::debug!(chord = %self.id(), error = %err, "rolled back partial acquisition");
                return match err {
                    Error::Allocation(AllocationError::Unavailable { .. }) => Ok(false),
                    other => Err(other),
                };
            }
        }

        let resources = chosen.iter().map(|(_, r)| r.label()).collect();
        state.allocation = Some(chosen);
        state.error = None;
        drop(state);
        drop(guard);

        self.inner.allocator.emit_allocation(AllocationEvent::Allocated {
            chord: self.id().get(),
            resources,
        });
        registry.notify_changed();
        Ok(true)
    }

    /// Block the calling thread until every request is satisfied.
    ///
    /// Tries once immediately when the fairness policy admits it, otherwise
    /// queues the chord and waits for a retry pass to allocate it.
    ///
    /// # Errors
    ///
    /// Returns registry errors, a failure captured during a retry pass, or
    /// the wait strategy's timeout.
    pub fn acquire_blocking(&self) -> Result<()> {
        if self.begin_acquire()? {
            return Ok(());
        }
        let allocator = self.allocator();
        let fairness = Arc::clone(allocator.fairness());
        let queued = self.enqueue(&fairness);
        let result = allocator.waiter().wait_until(&mut || {
            fairness.run_pass();
            self.check_progress()
        });
        self.finish_wait(queued, result)
    }

    /// Async form of [`Chord::acquire_blocking`] for cooperative tasks.
    ///
    /// Dropping the future before it completes takes the chord off the
    /// fairness queue; nothing is held in that case.
    ///
    /// # Errors
    ///
    /// Same as [`Chord::acquire_blocking`].
    pub async fn acquire_async(&self) -> Result<()> {
        if self.begin_acquire()? {
            return Ok(());
        }
        let allocator = self.allocator();
        let fairness = Arc::clone(allocator.fairness());
        let signal = Arc::clone(allocator.registry().signal());
        let queued = self.enqueue(&fairness);
        let result = wait::wait_until_async(&signal, allocator.backoff(), || {
            fairness.run_pass();
            self.check_progress()
        })
        .await;
        self.finish_wait(queued, result)
    }

    /// Returns whether the chord is already satisfied after the immediate
    /// attempt
    fn begin_acquire(&self) -> Result<bool> {
        {
            let mut state = self.inner.state.lock();
            if state.allocation.is_some() {
                return Ok(true);
            }
            state.error = None;
        }
        self.inner
            .allocator
            .emit_allocation(AllocationEvent::Requested {
                chord: self.id().get(),
                requests: self.requests().iter().map(ToString::to_string).collect(),
            });
        if self.inner.allocator.fairness().admits_immediate() {
            return self.try_allocate().inspect_err(|err| self.report_failure(err));
        }
        Ok(false)
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.inner.state.lock().pending
    }

    pub(crate) fn mark_pending(&self) {
        self.inner.state.lock().pending = true;
    }

    fn enqueue(&self, fairness: &Arc<dyn FairnessPolicy>) -> QueueGuard {
        self.mark_pending();
        fairness.add(self);
        self.inner
            .allocator
            .emit_allocation(AllocationEvent::Queued {
                chord: self.id().get(),
                pending: fairness.pending(),
            });
        QueueGuard {
            chord: self.downgrade(),
            id: self.id(),
            fairness: Arc::clone(fairness),
            settled: false,
        }
    }

    fn check_progress(&self) -> Result<bool> {
        let mut state = self.inner.state.lock();
        if let Some(err) = state.error.take() {
            return Err(err);
        }
        Ok(state.allocation.is_some())
    }

    fn finish_wait(&self, mut queued: QueueGuard, result: Result<()>) -> Result<()> {
        queued.settled = true;
        drop(queued);
        match result {
            Ok(()) => Ok(()),
            // a pass may have allocated us between the last check and giving up
            Err(_) if self.is_satisfied() => Ok(()),
            Err(err) => {
                self.report_failure(&err);
                Err(err)
            }
        }
    }

    /// Give back an allocation a retry pass granted after the caller
    /// stopped waiting for it
    fn abandon(&self) {
        if self.is_satisfied() {
            tracing::debug!(chord = %self.id(), "releasing allocation granted to a cancelled waiter");
            if let Err(err) = self.release() {
                tracing::error!(chord = %self.id(), error = %err, "release after cancellation failed");
            }
        }
        self.report_failure(&AllocationError::Cancelled.into());
    }

    fn report_failure(&self, err: &Error) {
        self.inner.allocator.emit_allocation(AllocationEvent::Failed {
            chord: self.id().get(),
            failure: FailureContext::from_error(err),
        });
    }

    /// Record a failure raised while a retry pass worked on this chord
    pub(crate) fn set_error(&self, err: Error) {
        self.inner.state.lock().error = Some(err);
    }

    /// Give back every held resource. A no-op when unsatisfied.
    ///
    /// # Errors
    ///
    /// Returns the first release refused by a resource; the remaining
    /// resources are still released and the chord ends up unsatisfied.
    pub fn release(&self) -> Result<()> {
        let registry = self.inner.allocator.registry();
        let (count, outcome) = {
            let _guard = registry.lock_allocation();
            let Some(allocation) = self.inner.state.lock().allocation.take() else {
                return Ok(());
            };
            let mut outcome = Ok(());
            for (request, resource) in &allocation {
                if let Err(err) = resource.release(request) {
                    tracing::warn!(chord = %self.id(), resource = %resource.label(), error = %err, "release refused");
                    if outcome.is_ok() {
                        outcome = Err(err);
                    }
                }
            }
            (allocation.len(), outcome)
        };
        self.inner.allocator.emit_allocation(AllocationEvent::Released {
            chord: self.id().get(),
            count,
        });
        registry.notify_changed();
        outcome
    }

    /// Held resources of `class` matching `filter`.
    ///
    /// The filter is applied to the resources themselves, independent of
    /// the attributes of the original requests.
    ///
    /// # Errors
    ///
    /// Returns `AllocationError::NotSatisfied` when nothing is held.
    pub fn find(
        &self,
        class: impl Into<ResourceClass>,
        filter: &Attributes,
    ) -> Result<Vec<Arc<dyn Resource>>> {
        let probe = Request::shared(class).with_attributes(filter.clone());
        let state = self.inner.state.lock();
        let allocation = state
            .allocation
            .as_ref()
            .ok_or(AllocationError::NotSatisfied)?;
        Ok(allocation
            .iter()
            .filter(|(_, resource)| resource.matches(&probe))
            .map(|(_, resource)| Arc::clone(resource))
            .collect())
    }

    /// The single held resource of `class` matching `filter`
    ///
    /// # Errors
    ///
    /// Returns `AllocationError::NotSatisfied`, `AllocationError::NotFound`
    /// or `AllocationError::Ambiguous`.
    pub fn get(
        &self,
        class: impl Into<ResourceClass>,
        filter: &Attributes,
    ) -> Result<Arc<dyn Resource>> {
        let class = class.into();
        let mut found = self.find(class.clone(), filter)?;
        match found.len() {
            1 => Ok(found.remove(0)),
            0 => Err(AllocationError::NotFound {
                class: class.to_string(),
                filter: filter.to_string(),
            }
            .into()),
            count => Err(AllocationError::Ambiguous {
                class: class.to_string(),
                filter: filter.to_string(),
                count,
            }
            .into()),
        }
    }

    /// Acquire and return a guard that releases on drop
    ///
    /// # Errors
    ///
    /// Same as [`Chord::acquire_blocking`].
    pub fn enter(&self) -> Result<ChordGuard> {
        self.acquire_blocking()?;
        Ok(ChordGuard::new(self.clone()))
    }

    /// Async form of [`Chord::enter`]
    ///
    /// # Errors
    ///
    /// Same as [`Chord::acquire_async`].
    pub async fn enter_async(&self) -> Result<ChordGuard> {
        self.acquire_async().await?;
        Ok(ChordGuard::new(self.clone()))
    }

    /// Run `work` with every request satisfied, releasing afterwards
    /// whatever `work` returns
    ///
    /// # Errors
    ///
    /// Returns acquisition and release errors converted into `E`, or the
    /// error returned by `work`. A failing `work` takes precedence.
    pub fn scoped<T, E, F>(&self, work: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Chord) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let guard = self.enter()?;
        let outcome = work(&guard);
        let released = guard.release();
        let value = outcome?;
        released?;
        Ok(value)
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        let status = if state.allocation.is_some() {
            "satisfied"
        } else {
            "unsatisfied"
        };
        write!(f, "<Chord {} {status} [", self.inner.id)?;
        for (i, request) in state.requests.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{request}")?;
        }
        write!(f, "]>")
    }
}

fn roll_back(acquired: &[(Request, Arc<dyn Resource>)]) {
    for (request, resource) in acquired.iter().rev() {
        if let Err(err) = resource.release(request) {
            tracing::error!(resource = %resource.label(), error = %err, "rollback release failed");
        }
    }
}

/// Takes a queued chord off the fairness queue when its caller stops waiting.
///
/// Dropped unsettled, the wait was cancelled: anything a retry pass granted
/// in the meantime is released again.
struct QueueGuard {
    chord: WeakChord,
    id: ChordId,
    fairness: Arc<dyn FairnessPolicy>,
    /// Set once the waiting caller has seen the outcome
    settled: bool,
}

impl Drop for QueueGuard {
    fn drop(&mut self) {
        let chord = self.chord.upgrade();
        if let Some(chord) = &chord {
            chord.inner.state.lock().pending = false;
        }
        self.fairness.remove(self.id);
        if let (false, Some(chord)) = (self.settled, chord) {
            chord.abandon();
        }
    }
}

/// Satisfied chord that releases its resources when dropped
#[derive(Debug)]
pub struct ChordGuard {
    chord: Chord,
    armed: bool,
}

impl ChordGuard {
    fn new(chord: Chord) -> Self {
        Self { chord, armed: true }
    }

    /// Release now instead of on drop
    ///
    /// # Errors
    ///
    /// Returns the error of [`Chord::release`].
    pub fn release(mut self) -> Result<()> {
        self.armed = false;
        self.chord.release()
    }
}

impl Deref for ChordGuard {
    type Target = Chord;

    fn deref(&self) -> &Chord {
        &self.chord
    }
}

impl Drop for ChordGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(err) = self.chord.release() {
            tracing::error!(chord = %self.chord.id(), error = %err, "release on scope exit failed");
        }
    }
}
