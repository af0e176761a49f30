//! Arbitration among chords waiting for resources
//!
//! Chords that cannot be satisfied immediately are queued on the allocator's
//! fairness policy in arrival order. Waiters drive retry passes; a pass walks
//! a snapshot of the queue and offers chords a new allocation attempt.

use crate::chord::{Chord, ChordId, WeakChord};
use crate::clock::{Clock, SystemClock};
use chords_events::{EventEmitter, EventSender, FairnessEvent, SkipReason};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Result of one [`FairnessPolicy::run_pass`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassOutcome {
    pub allocated: usize,
    pub failed: usize,
    /// Chords not offered an attempt because an older chord was blocked
    pub held_back: usize,
    /// Set when the pass did not run
    pub skipped: Option<SkipReason>,
}

/// Owner of the pending queue and its ordering guarantee
pub trait FairnessPolicy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Enqueue `chord` unless it is already queued
    fn add(&self, chord: &Chord);

    /// Dequeue the chord if present
    fn remove(&self, id: ChordId);

    fn pending(&self) -> usize;

    /// Whether a chord that just asked for resources may try before queueing
    fn admits_immediate(&self) -> bool;

    /// Offer queued chords another allocation attempt
    fn run_pass(&self) -> PassOutcome;
}

#[derive(Debug, Default)]
struct PendingQueue {
    entries: Mutex<Vec<(ChordId, WeakChord)>>,
}

impl PendingQueue {
    fn add(&self, chord: &Chord) {
        let mut entries = self.entries.lock();
        let id = chord.id();
        if !entries.iter().any(|(queued, _)| *queued == id) {
            entries.push((id, chord.downgrade()));
        }
    }

    fn remove(&self, id: ChordId) {
        self.entries.lock().retain(|(queued, _)| *queued != id);
    }

    fn snapshot(&self) -> Vec<(ChordId, WeakChord)> {
        self.entries.lock().clone()
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Walk the queue once in arrival order. With `head_of_line`, stop at
    /// the first chord that stays blocked.
    fn walk(&self, head_of_line: bool) -> PassOutcome {
        let snapshot = self.snapshot();
        let mut outcome = PassOutcome::default();
        for (index, (id, weak)) in snapshot.iter().enumerate() {
            let Some(chord) = weak.upgrade() else {
                self.remove(*id);
                continue;
            };
            if !chord.is_pending() {
                continue;
            }
            match chord.try_allocate_pending() {
                Ok(true) => {
                    outcome.allocated += 1;
                    self.remove(*id);
                }
                Ok(false) if head_of_line => {
                    outcome.held_back = snapshot.len() - index - 1;
                    break;
                }
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(chord = %id, error = %err, "allocation failed during retry pass");
                    chord.set_error(err);
                    outcome.failed += 1;
                    self.remove(*id);
                }
            }
        }
        outcome
    }
}

/// Rate limit and single-flight guard shared by both policies
#[derive(Debug)]
struct PassGate {
    running: AtomicBool,
    last_run: Mutex<Option<Duration>>,
    min_interval: Duration,
    clock: Arc<dyn Clock>,
}

struct RunningFlag<'a>(&'a AtomicBool);

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl PassGate {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            last_run: Mutex::new(None),
            min_interval: Duration::ZERO,
            clock: Arc::new(SystemClock::new()),
        }
    }

    fn enter(&self) -> Result<RunningFlag<'_>, SkipReason> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SkipReason::AlreadyRunning);
        }
        let flag = RunningFlag(&self.running);
        let now = self.clock.now();
        let mut last_run = self.last_run.lock();
        if last_run.is_some_and(|last| now.saturating_sub(last) < self.min_interval) {
            return Err(SkipReason::TooSoon);
        }
        *last_run = Some(now);
        Ok(flag)
    }
}

macro_rules! policy_builders {
    ($policy:ty) => {
        impl $policy {
            /// Minimum time between the starts of two passes
            #[must_use]
            pub fn with_min_interval(mut self, interval: Duration) -> Self {
                self.gate.min_interval = interval;
                self
            }

            #[must_use]
            pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
                self.gate.clock = clock;
                self
            }

            #[must_use]
            pub fn with_events(mut self, sender: EventSender) -> Self {
                self.events = Some(sender);
                self
            }

            fn run_gated(&self, head_of_line: bool) -> PassOutcome {
                let pending = self.queue.len();
                if pending == 0 {
                    return PassOutcome::default();
                }
                let _running = match self.gate.enter() {
                    Ok(flag) => flag,
                    Err(reason) => {
                        self.emit_fairness(FairnessEvent::PassSkipped { reason });
                        return PassOutcome {
                            skipped: Some(reason),
                            ..PassOutcome::default()
                        };
                    }
                };
                self.emit_fairness(FairnessEvent::PassStarted {
                    policy: self.name().to_string(),
                    pending,
                });
                let outcome = self.queue.walk(head_of_line);
                self.emit_fairness(FairnessEvent::PassCompleted {
                    policy: self.name().to_string(),
                    allocated: outcome.allocated,
                    failed: outcome.failed,
                    held_back: outcome.held_back,
                });
                outcome
            }
        }

        impl Default for $policy {
            fn default() -> Self {
                Self::new()
            }
        }

        impl EventEmitter for $policy {
            fn event_sender(&self) -> Option<&EventSender> {
                self.events.as_ref()
            }
        }
    };
}

/// Arrival-ordered retries where any queued chord may succeed.
///
/// Every pass offers each queued chord an attempt, oldest first, so a newer
/// chord can overtake an older one that needs resources still held. A chord
/// whose attempt fails with an error gets the error and leaves the queue;
/// the pass carries on with the others.
#[derive(Debug)]
pub struct BestEffortFairness {
    queue: PendingQueue,
    gate: PassGate,
    events: Option<EventSender>,
}

impl BestEffortFairness {
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: PendingQueue::default(),
            gate: PassGate::new(),
            events: None,
        }
    }
}

policy_builders!(BestEffortFairness);

impl FairnessPolicy for BestEffortFairness {
    fn name(&self) -> &'static str {
        "best_effort"
    }

    fn add(&self, chord: &Chord) {
        self.queue.add(chord);
    }

    fn remove(&self, id: ChordId) {
        self.queue.remove(id);
    }

    fn pending(&self) -> usize {
        self.queue.len()
    }

    fn admits_immediate(&self) -> bool {
        true
    }

    fn run_pass(&self) -> PassOutcome {
        self.run_gated(false)
    }
}

/// Head-of-line service in arrival order.
///
/// A pass stops at the oldest chord that still cannot be satisfied; no
/// younger chord attempts allocation until it succeeds or leaves. New
/// chords only try immediately while the queue is empty.
#[derive(Debug)]
pub struct StrictFifoFairness {
    queue: PendingQueue,
    gate: PassGate,
    events: Option<EventSender>,
}

impl StrictFifoFairness {
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: PendingQueue::default(),
            gate: PassGate::new(),
            events: None,
        }
    }
}

policy_builders!(StrictFifoFairness);

impl FairnessPolicy for StrictFifoFairness {
    fn name(&self) -> &'static str {
        "strict_fifo"
    }

    fn add(&self, chord: &Chord) {
        self.queue.add(chord);
    }

    fn remove(&self, id: ChordId) {
        self.queue.remove(id);
    }

    fn pending(&self) -> usize {
        self.queue.len()
    }

    fn admits_immediate(&self) -> bool {
        self.queue.len() == 0
    }

    fn run_pass(&self) -> PassOutcome {
        self.run_gated(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::Allocator;
    use crate::clock::ManualClock;
    use chords_resources::{BasicResource, Registry, Resource};
    use chords_types::Request;

    fn allocator_with_one_slot(fairness: Arc<dyn FairnessPolicy>) -> (Allocator, Arc<dyn Resource>) {
        let registry = Arc::new(Registry::new());
        registry.register_default("slot").unwrap();
        let slot: Arc<dyn Resource> = Arc::new(BasicResource::new("slot"));
        registry.add_resource(Arc::clone(&slot)).unwrap();
        (Allocator::new(registry).with_fairness(fairness), slot)
    }

    fn queued(allocator: &Allocator, request: Request) -> Chord {
        let chord = allocator.chord().with(request).unwrap();
        chord.mark_pending();
        allocator.fairness().add(&chord);
        chord
    }

    #[test]
    fn test_add_is_idempotent_and_remove_too() {
        let fairness = Arc::new(BestEffortFairness::new());
        let (allocator, _) = allocator_with_one_slot(fairness.clone());
        let chord = allocator.chord();
        fairness.add(&chord);
        fairness.add(&chord);
        assert_eq!(fairness.pending(), 1);
        fairness.remove(chord.id());
        fairness.remove(chord.id());
        assert_eq!(fairness.pending(), 0);
    }

    #[test]
    fn test_pass_is_rate_limited() {
        let clock = Arc::new(ManualClock::new());
        let fairness = Arc::new(
            BestEffortFairness::new()
                .with_clock(clock.clone())
                .with_min_interval(Duration::from_millis(10)),
        );
        let (allocator, slot) = allocator_with_one_slot(fairness.clone());
        let exclusive = Request::exclusive("slot");
        slot.acquire(&exclusive).unwrap();
        let _waiting = queued(&allocator, Request::exclusive("slot"));

        assert_eq!(fairness.run_pass().skipped, None);
        assert_eq!(fairness.run_pass().skipped, Some(SkipReason::TooSoon));
        clock.advance(Duration::from_millis(10));
        assert_eq!(fairness.run_pass().skipped, None);
    }

    #[test]
    fn test_best_effort_lets_younger_chord_through() {
        let fairness: Arc<dyn FairnessPolicy> = Arc::new(BestEffortFairness::new());
        let (allocator, slot) = allocator_with_one_slot(Arc::clone(&fairness));
        allocator.registry().register_default("other").unwrap();
        allocator
            .registry()
            .add_resource(Arc::new(BasicResource::new("other")))
            .unwrap();
        slot.acquire(&Request::exclusive("slot")).unwrap();

        let older = queued(&allocator, Request::exclusive("slot"));
        let younger = queued(&allocator, Request::exclusive("other"));
        let outcome = fairness.run_pass();
        assert_eq!(outcome.allocated, 1);
        assert!(!older.is_satisfied());
        assert!(younger.is_satisfied());
        assert_eq!(fairness.pending(), 1);
    }

    #[test]
    fn test_strict_fifo_holds_back_younger_chord() {
        let fairness: Arc<dyn FairnessPolicy> = Arc::new(StrictFifoFairness::new());
        let (allocator, slot) = allocator_with_one_slot(Arc::clone(&fairness));
        allocator.registry().register_default("other").unwrap();
        allocator
            .registry()
            .add_resource(Arc::new(BasicResource::new("other")))
            .unwrap();
        let held = Request::exclusive("slot");
        slot.acquire(&held).unwrap();

        let older = queued(&allocator, Request::exclusive("slot"));
        let younger = queued(&allocator, Request::exclusive("other"));
        assert!(!fairness.admits_immediate());
        let outcome = fairness.run_pass();
        assert_eq!(outcome.allocated, 0);
        assert_eq!(outcome.held_back, 1);
        assert!(!younger.is_satisfied());

        slot.release(&held).unwrap();
        let outcome = fairness.run_pass();
        assert_eq!(outcome.allocated, 2);
        assert!(older.is_satisfied());
        assert!(younger.is_satisfied());
        assert!(fairness.admits_immediate());
    }

    #[test]
    fn test_failure_is_isolated() {
        let fairness: Arc<dyn FairnessPolicy> = Arc::new(BestEffortFairness::new());
        let (allocator, _slot) = allocator_with_one_slot(Arc::clone(&fairness));
        let broken = queued(&allocator, Request::shared("missing"));
        let healthy = queued(&allocator, Request::shared("slot"));
        let outcome = fairness.run_pass();
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.allocated, 1);
        assert!(healthy.is_satisfied());
        assert!(!broken.is_satisfied());
        assert_eq!(fairness.pending(), 0);
    }

    #[test]
    fn test_dropped_chord_leaves_queue() {
        let fairness: Arc<dyn FairnessPolicy> = Arc::new(BestEffortFairness::new());
        let (allocator, slot) = allocator_with_one_slot(Arc::clone(&fairness));
        slot.acquire(&Request::exclusive("slot")).unwrap();
        drop(queued(&allocator, Request::exclusive("slot")));
        assert_eq!(fairness.pending(), 1);
        fairness.run_pass();
        assert_eq!(fairness.pending(), 0);
    }
}
